use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::ReferenceCatalog;
use crate::error::{EmptyInputError, PageError};
use crate::normalize::Normalizer;
use crate::ocr::{DEFAULT_LINE_GAP, OcrPage, cluster, segment};
use crate::propagate::{PropagationOptions, propagate};
use crate::table::{ConsolidatedTable, EnrichedTable, assemble};

/// Everything a page needs besides its own OCR output. Shared read-only
/// between workers.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub normalizer: Arc<Normalizer>,
    pub catalog: Arc<ReferenceCatalog>,
    pub options: PropagationOptions,
    pub line_gap: f64,
    /// Used by pages that carry no cuts of their own.
    pub cuts: Option<Vec<f64>>,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self {
            normalizer: Arc::new(Normalizer::default()),
            catalog: Arc::new(ReferenceCatalog::default()),
            options: PropagationOptions::default(),
            line_gap: DEFAULT_LINE_GAP,
            cuts: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageJob {
    pub id: String,
    pub page: OcrPage,
    pub cuts: Option<Vec<f64>>,
}

impl PageJob {
    pub fn new(id: impl Into<String>, page: OcrPage) -> Self {
        Self {
            id: id.into(),
            page,
            cuts: None,
        }
    }

    pub fn with_cuts(mut self, cuts: Option<Vec<f64>>) -> Self {
        self.cuts = cuts;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub id: String,
    pub success: bool,
    pub table: Option<EnrichedTable>,
    pub error: Option<String>,
}

impl PageOutcome {
    fn succeeded(id: String, table: EnrichedTable) -> Self {
        Self {
            id,
            success: true,
            table: Some(table),
            error: None,
        }
    }

    fn failed(id: String, message: String) -> Self {
        Self {
            id,
            success: false,
            table: None,
            error: Some(message),
        }
    }
}

/// Runs one page end to end. Failures stay inside the outcome.
pub fn process_page(ctx: &PipelineContext, job: PageJob) -> PageOutcome {
    match run_page(ctx, &job) {
        Ok(table) => {
            debug!(id = %job.id, rows = table.rows.len(), width = table.width, "page processed");
            PageOutcome::succeeded(job.id, table)
        }
        Err(err) => {
            warn!(id = %job.id, error = %err, "page failed");
            PageOutcome::failed(job.id, err.to_string())
        }
    }
}

fn run_page(ctx: &PipelineContext, job: &PageJob) -> Result<EnrichedTable, PageError> {
    let fragments = job.page.fragments(&ctx.normalizer)?;
    let lines = cluster(fragments, ctx.line_gap)?;
    let cuts = job.cuts.as_deref().or(ctx.cuts.as_deref());
    let table = segment(&lines, cuts)?;
    Ok(propagate(&table, &ctx.catalog, &ctx.options))
}

/// Processes pages on up to `workers` blocking threads and returns the
/// outcomes in job order, whatever order they finished in.
pub async fn process_batch(
    jobs: Vec<PageJob>,
    ctx: Arc<PipelineContext>,
    workers: usize,
) -> Vec<PageOutcome> {
    let workers = resolve_workers(workers);
    debug!(pages = jobs.len(), workers, "processing batch");
    let mut finished: Vec<(usize, PageOutcome)> = stream::iter(jobs.into_iter().enumerate())
        .map(|(index, job)| {
            let ctx = Arc::clone(&ctx);
            async move {
                let id = job.id.clone();
                let outcome =
                    match tokio::task::spawn_blocking(move || process_page(&ctx, job)).await {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            warn!(id = %id, error = %err, "page worker failed");
                            PageOutcome::failed(id, format!("page worker failed: {}", err))
                        }
                    };
                (index, outcome)
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await;
    finished.sort_by_key(|(index, _)| *index);
    finished.into_iter().map(|(_, outcome)| outcome).collect()
}

/// A page as handed in by the caller; loading it may already have failed.
#[derive(Debug, Clone)]
pub enum PageInput {
    Ready(PageJob),
    Failed { id: String, error: String },
}

/// Like [`process_batch`], keeping pages that failed to load in their place.
pub async fn process_inputs(
    inputs: Vec<PageInput>,
    ctx: Arc<PipelineContext>,
    workers: usize,
) -> Vec<PageOutcome> {
    let mut slots: Vec<Option<PageOutcome>> = Vec::with_capacity(inputs.len());
    let mut jobs = Vec::new();
    for input in inputs {
        match input {
            PageInput::Ready(job) => {
                slots.push(None);
                jobs.push(job);
            }
            PageInput::Failed { id, error } => {
                warn!(id = %id, error = %error, "page could not be loaded");
                slots.push(Some(PageOutcome::failed(id, error)));
            }
        }
    }
    let mut processed = process_batch(jobs, ctx, workers).await.into_iter();
    slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| processed.next()))
        .collect()
}

pub fn resolve_workers(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get().max(1)
    } else {
        requested
    }
}

/// Assembles the successful pages, in order.
pub fn consolidate(outcomes: &[PageOutcome]) -> Result<ConsolidatedTable, EmptyInputError> {
    let tables = outcomes
        .iter()
        .filter_map(|outcome| outcome.table.clone())
        .collect();
    assemble(tables)
}

/// Per-image cut positions chosen in the column editor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LinesFile {
    #[serde(default)]
    pub lines: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub line_gap: Option<f64>,
}

impl LinesFile {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Cuts for an image id; keys match exactly or by file stem
    /// (`img_001.jpg` serves `img_001.json`).
    pub fn cuts_for(&self, id: &str) -> Option<Vec<f64>> {
        if let Some(cuts) = self.lines.get(id) {
            return Some(cuts.clone());
        }
        let stem = file_stem(id)?;
        self.lines
            .iter()
            .find(|(key, _)| file_stem(key) == Some(stem))
            .map(|(_, cuts)| cuts.clone())
    }
}

fn file_stem(name: &str) -> Option<&str> {
    Path::new(name).file_stem().and_then(|stem| stem.to_str())
}
