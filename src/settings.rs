use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::BrandMatch;
use crate::normalize::{DEFAULT_PHRASES, DEFAULT_SYMBOLS, Normalizer};
use crate::ocr::DEFAULT_LINE_GAP;
use crate::propagate::{ModelSource, PropagationOptions};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub line_gap: f64,
    pub cuts: Vec<f64>,
    pub symbols: Vec<String>,
    pub phrases: Vec<String>,
    pub catalog_path: Option<String>,
    pub search_columns: Vec<usize>,
    pub year_column: usize,
    pub model_source: ModelSource,
    pub brand_match: BrandMatch,
    pub short_model_words: usize,
    pub workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let options = PropagationOptions::default();
        Self {
            line_gap: DEFAULT_LINE_GAP,
            cuts: Vec::new(),
            symbols: DEFAULT_SYMBOLS.iter().map(|value| value.to_string()).collect(),
            phrases: DEFAULT_PHRASES.iter().map(|value| value.to_string()).collect(),
            catalog_path: None,
            search_columns: options.search_columns,
            year_column: options.year_column,
            model_source: options.model_source,
            brand_match: options.brand_match,
            short_model_words: options.short_model_words,
            workers: 0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    layout: Option<LayoutSettings>,
    normalize: Option<NormalizeSettings>,
    catalog: Option<CatalogSettings>,
    propagation: Option<PropagationSettings>,
    runtime: Option<RuntimeSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutSettings {
    line_gap: Option<f64>,
    cuts: Option<Vec<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct NormalizeSettings {
    symbols: Option<Vec<String>>,
    phrases: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogSettings {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PropagationSettings {
    search_columns: Option<Vec<usize>>,
    year_column: Option<usize>,
    model_source: Option<ModelSource>,
    brand_match: Option<BrandMatch>,
    short_model_words: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RuntimeSettings {
    workers: Option<usize>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let embedded: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).context("failed to parse default settings")?;
    settings.merge(embedded);
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(layout) = incoming.layout {
            if let Some(gap) = layout.line_gap {
                if gap.is_finite() && gap >= 0.0 {
                    self.line_gap = gap;
                }
            }
            if let Some(cuts) = layout.cuts {
                self.cuts = cuts;
            }
        }
        if let Some(normalize) = incoming.normalize {
            if let Some(symbols) = normalize.symbols {
                self.symbols = symbols;
            }
            if let Some(phrases) = normalize.phrases {
                self.phrases = phrases;
            }
        }
        if let Some(catalog) = incoming.catalog {
            if let Some(path) = catalog.path {
                if !path.trim().is_empty() {
                    self.catalog_path = Some(path);
                }
            }
        }
        if let Some(propagation) = incoming.propagation {
            if let Some(columns) = propagation.search_columns {
                if !columns.is_empty() {
                    self.search_columns = columns;
                }
            }
            if let Some(column) = propagation.year_column {
                self.year_column = column;
            }
            if let Some(source) = propagation.model_source {
                self.model_source = source;
            }
            if let Some(mode) = propagation.brand_match {
                self.brand_match = mode;
            }
            if let Some(words) = propagation.short_model_words {
                if words > 0 {
                    self.short_model_words = words;
                }
            }
        }
        if let Some(runtime) = incoming.runtime {
            if let Some(workers) = runtime.workers {
                self.workers = workers;
            }
        }
    }

    pub fn normalizer(&self) -> Result<Normalizer> {
        Normalizer::new(self.symbols.iter().cloned(), self.phrases.iter().cloned())
            .context("failed to compile [normalize] phrases")
    }

    pub fn propagation_options(&self) -> PropagationOptions {
        PropagationOptions {
            search_columns: self.search_columns.clone(),
            year_column: self.year_column,
            model_source: self.model_source,
            brand_match: self.brand_match,
            short_model_words: self.short_model_words,
        }
    }

    /// Global cuts, or `None` when rows should be split per fragment.
    pub fn default_cuts(&self) -> Option<Vec<f64>> {
        if self.cuts.is_empty() {
            None
        } else {
            Some(self.cuts.clone())
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".price-list-ocr"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn embedded_defaults_match_code_defaults() {
        let mut settings = Settings::default();
        settings.merge(toml::from_str(DEFAULT_SETTINGS_TOML).expect("default settings"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn home_settings_are_created_and_layered() {
        with_temp_home(|home| {
            let dir = home.join(".price-list-ocr");
            let settings = load_settings(None).expect("settings");
            assert!(dir.join("settings.toml").exists());
            assert_eq!(settings.line_gap, DEFAULT_LINE_GAP);

            fs::write(
                dir.join("settings.local.toml"),
                "[layout]\nline_gap = 9.0\ncuts = [680.0, 120.0]\n\n[propagation]\nmodel_source = \"heuristic\"\nbrand_match = \"word\"\n",
            )
            .expect("write local");
            let settings = load_settings(None).expect("settings");
            assert_eq!(settings.line_gap, 9.0);
            assert_eq!(settings.default_cuts(), Some(vec![680.0, 120.0]));
            assert_eq!(settings.model_source, ModelSource::Heuristic);
            assert_eq!(settings.brand_match, BrandMatch::Word);
            assert_eq!(settings.search_columns, vec![0, 1, 2, 3]);
        });
    }

    #[test]
    fn extra_file_overrides_and_must_exist() {
        with_temp_home(|home| {
            let extra = home.join("extra.toml");
            fs::write(
                &extra,
                "[catalog]\npath = \"data.json\"\n\n[runtime]\nworkers = 2\n\n[propagation]\nshort_model_words = 0\n",
            )
            .expect("write extra");
            let settings = load_settings(Some(&extra)).expect("settings");
            assert_eq!(settings.catalog_path.as_deref(), Some("data.json"));
            assert_eq!(settings.workers, 2);
            assert_eq!(settings.short_model_words, 3);

            let missing = home.join("missing.toml");
            assert!(load_settings(Some(&missing)).is_err());
        });
    }

    #[test]
    fn unknown_model_source_is_rejected() {
        with_temp_home(|home| {
            let extra = home.join("bad.toml");
            fs::write(&extra, "[propagation]\nmodel_source = \"guess\"\n").expect("write");
            let err = load_settings(Some(&extra)).expect_err("bad settings");
            assert!(err.to_string().contains("failed to parse settings"));
        });
    }

    #[test]
    fn builds_pipeline_parts() {
        let settings = Settings {
            phrases: vec!["Precios".to_string()],
            ..Settings::default()
        };
        let normalizer = settings.normalizer().expect("normalizer");
        assert_eq!(normalizer.normalize("Precios Ford"), "Ford");
        assert_eq!(settings.propagation_options(), PropagationOptions::default());
        assert_eq!(settings.default_cuts(), None);
    }
}
