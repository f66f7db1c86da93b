use std::sync::Arc;

use tracing::info;

use crate::catalog::ReferenceCatalog;
use crate::error::{EmptyInputError, PageError};
use crate::ocr::OcrPage;
use crate::pipeline::{PageInput, PageJob, PipelineContext, consolidate, process_inputs};

use super::models::{PageSummary, ProcessRequest, ProcessResponse};
use super::state::ServerState;

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: axum::http::StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: axum::http::StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

pub(crate) async fn process_request(
    state: &ServerState,
    request: ProcessRequest,
) -> Result<ProcessResponse, ServerError> {
    if request.pages.is_empty() {
        return Err(ServerError::bad_request(EmptyInputError.to_string()));
    }

    let catalog = match request.catalog {
        Some(value) => Arc::new(
            ReferenceCatalog::from_value(value)
                .map_err(|err| ServerError::bad_request(err.to_string()))?,
        ),
        None => Arc::clone(&state.catalog),
    };
    let line_gap = request.line_gap.unwrap_or(state.settings.line_gap);
    if !line_gap.is_finite() || line_gap < 0.0 {
        return Err(ServerError::bad_request(
            PageError::InvalidLineGap(line_gap).to_string(),
        ));
    }
    let cuts = request
        .cuts
        .filter(|cuts| !cuts.is_empty())
        .or_else(|| state.settings.default_cuts());
    let ctx = PipelineContext {
        normalizer: Arc::clone(&state.normalizer),
        catalog,
        options: state.settings.propagation_options(),
        line_gap,
        cuts,
    };

    let inputs = request
        .pages
        .into_iter()
        .map(|page| match OcrPage::from_value(page.ocr) {
            Ok(ocr) => PageInput::Ready(PageJob::new(page.id, ocr).with_cuts(page.cuts)),
            Err(err) => PageInput::Failed {
                id: page.id,
                error: err.to_string(),
            },
        })
        .collect::<Vec<_>>();
    let workers = request.workers.unwrap_or(state.settings.workers);
    let outcomes = process_inputs(inputs, Arc::new(ctx), workers).await;

    let table = consolidate(&outcomes).unwrap_or_default();
    let pages = outcomes
        .into_iter()
        .map(|outcome| PageSummary {
            rows: outcome.table.as_ref().map_or(0, |table| table.rows.len()),
            id: outcome.id,
            success: outcome.success,
            error: outcome.error,
        })
        .collect::<Vec<_>>();
    info!(
        pages = pages.len(),
        failed = pages.iter().filter(|page| !page.success).count(),
        rows = table.len(),
        "processed request"
    );
    Ok(ProcessResponse { pages, table })
}
