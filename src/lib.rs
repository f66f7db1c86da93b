use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod catalog;
pub mod error;
pub mod export;
pub mod logging;
pub mod normalize;
pub mod ocr;
pub mod pipeline;
pub mod propagate;
pub mod server;
pub mod settings;
pub mod table;
#[cfg(test)]
mod test_util;

pub use catalog::{BrandMatch, ReferenceCatalog};
pub use error::{EmptyInputError, PageError, ReferenceLoadError};
pub use export::OutputFormat;
pub use normalize::Normalizer;
pub use ocr::{Fragment, Line, OcrPage};
pub use pipeline::{PageInput, PageJob, PageOutcome, PipelineContext};
pub use propagate::{ModelSource, PropagationOptions};
pub use table::{ConsolidatedTable, EnrichedRow, EnrichedTable, Table};

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// OCR result files, in output order.
    pub inputs: Vec<PathBuf>,
    pub lines_path: Option<PathBuf>,
    pub cuts: Option<Vec<f64>>,
    pub line_gap: Option<f64>,
    pub catalog_path: Option<PathBuf>,
    pub format: OutputFormat,
    pub workers: Option<usize>,
    pub settings_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub rendered: String,
    pub table: ConsolidatedTable,
    pub outcomes: Vec<PageOutcome>,
}

impl RunOutput {
    pub fn failures(&self) -> impl Iterator<Item = &PageOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.success)
    }
}

pub async fn run(config: Config) -> Result<RunOutput> {
    if config.inputs.is_empty() {
        return Err(anyhow!("no OCR result files given"));
    }
    let settings = settings::load_settings(config.settings_path.as_deref())?;

    let catalog_path = config
        .catalog_path
        .clone()
        .or_else(|| settings.catalog_path.as_ref().map(PathBuf::from));
    let catalog = match catalog_path {
        Some(path) => ReferenceCatalog::load_path(&path)?,
        None => ReferenceCatalog::default(),
    };

    let lines = match config.lines_path.as_deref() {
        Some(path) => Some(load_lines(path)?),
        None => None,
    };
    let line_gap = config
        .line_gap
        .or_else(|| lines.as_ref().and_then(|lines| lines.line_gap))
        .unwrap_or(settings.line_gap);
    if !line_gap.is_finite() || line_gap < 0.0 {
        return Err(PageError::InvalidLineGap(line_gap).into());
    }
    let cuts = config
        .cuts
        .clone()
        .filter(|cuts| !cuts.is_empty())
        .or_else(|| settings.default_cuts());

    let ctx = PipelineContext {
        normalizer: Arc::new(settings.normalizer()?),
        catalog: Arc::new(catalog),
        options: settings.propagation_options(),
        line_gap,
        cuts,
    };
    let inputs = config
        .inputs
        .iter()
        .map(|path| load_input(path, lines.as_ref()))
        .collect::<Vec<_>>();
    let workers = config.workers.unwrap_or(settings.workers);
    let outcomes = pipeline::process_inputs(inputs, Arc::new(ctx), workers).await;

    let table = pipeline::consolidate(&outcomes).map_err(|err| {
        let reasons = outcomes
            .iter()
            .filter_map(|outcome| {
                outcome
                    .error
                    .as_deref()
                    .map(|error| format!("{}: {}", outcome.id, error))
            })
            .collect::<Vec<_>>();
        anyhow!("every page failed ({}): {}", err, reasons.join("; "))
    })?;
    let rendered = export::render(&table, config.format)?;
    Ok(RunOutput {
        rendered,
        table,
        outcomes,
    })
}

fn load_lines(path: &Path) -> Result<pipeline::LinesFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read lines file: {}", path.display()))?;
    pipeline::LinesFile::from_json(&raw)
        .with_context(|| format!("failed to parse lines file: {}", path.display()))
}

fn load_input(path: &Path, lines: Option<&pipeline::LinesFile>) -> PageInput {
    let id = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string());
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            return PageInput::Failed {
                error: format!("failed to read {}: {}", path.display(), err),
                id,
            };
        }
    };
    match OcrPage::from_json(&raw) {
        Ok(page) => {
            let cuts = lines.and_then(|lines| lines.cuts_for(&id));
            PageInput::Ready(PageJob::new(id, page).with_cuts(cuts))
        }
        Err(err) => PageInput::Failed {
            id,
            error: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("write");
        path
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_files_with_lines_and_catalog() {
        let dir = tempfile::tempdir().expect("tempdir");
        let page = write(
            dir.path(),
            "img_001.json",
            r#"{"res": {"rec_texts": ["FORD", "2024", "Ranger", "XLT 4x2", "$45,000"],
                        "rec_boxes": [[10, 10, 50, 20], [150, 25, 190, 35], [150, 40, 190, 50],
                                      [150, 70, 220, 80], [400, 71, 450, 80]]}}"#,
        );
        let broken = write(dir.path(), "img_002.json", "{oops");
        let lines = write(
            dir.path(),
            "lines.json",
            r#"{"lines": {"img_001.jpg": [300, 100]}, "line_gap": 6.5}"#,
        );
        let catalog = write(dir.path(), "data.json", r#"{"Ford": ["Ranger"]}"#);

        let output = with_temp_home(|_| {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(run(Config {
                    inputs: vec![page, broken, dir.path().join("missing.json")],
                    lines_path: Some(lines),
                    catalog_path: Some(catalog),
                    format: OutputFormat::Tsv,
                    workers: Some(2),
                    ..Config::default()
                }))
            })
        })
        .expect("run");

        assert_eq!(output.failures().count(), 2);
        assert_eq!(output.outcomes[1].id, "img_002.json");
        assert_eq!(
            output.rendered,
            "marca\tmodelo\taño\tversion\tcol_0\tcol_1\tcol_2\n\
             FORD\t\t\t\tFORD\t\t\n\
             FORD\t\t2024\t\t\t2024\t\n\
             FORD\tRANGER\t2024\t\t\tRanger\t\n\
             FORD\tRANGER\t2024\tXLT 4x2\t\tXLT 4x2\t$45,000\n"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fails_when_no_page_survives() {
        let dir = tempfile::tempdir().expect("tempdir");
        let empty = write(dir.path(), "empty.json", r#"{"rec_texts": [], "rec_boxes": []}"#);
        let result = with_temp_home(|_| {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(run(Config {
                    inputs: vec![empty],
                    ..Config::default()
                }))
            })
        });
        let err = result.expect_err("no pages");
        assert!(err.to_string().contains("empty.json: OCR produced no usable output"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_missing_inputs_and_catalogs() {
        assert!(run(Config::default()).await.is_err());

        let dir = tempfile::tempdir().expect("tempdir");
        let page = write(dir.path(), "p.json", r#"{"rec_texts": ["a"], "rec_boxes": [[0, 0, 1, 1]]}"#);
        let result = with_temp_home(|_| {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(run(Config {
                    inputs: vec![page],
                    catalog_path: Some(dir.path().join("nope.json")),
                    ..Config::default()
                }))
            })
        });
        let err = result.expect_err("missing catalog");
        assert!(err.downcast_ref::<ReferenceLoadError>().is_some());
    }
}
