use std::sync::Arc;

use anyhow::Result;

use crate::catalog::ReferenceCatalog;
use crate::normalize::Normalizer;
use crate::settings;

/// Loaded once at startup and shared by every request.
#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) settings: settings::Settings,
    pub(crate) normalizer: Arc<Normalizer>,
    pub(crate) catalog: Arc<ReferenceCatalog>,
}

impl ServerState {
    pub(crate) fn new(settings: settings::Settings, catalog: ReferenceCatalog) -> Result<Self> {
        Ok(Self {
            normalizer: Arc::new(settings.normalizer()?),
            catalog: Arc::new(catalog),
            settings,
        })
    }
}
