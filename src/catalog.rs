use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::ReferenceLoadError;
use crate::normalize::fold_key;

/// How a cell is compared against catalog brand names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrandMatch {
    /// The whole cell must equal a brand.
    #[default]
    Exact,
    /// A brand may also appear as a whole word inside the cell.
    Word,
}

/// Read-only brand → models lookup, keyed by folded names.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    brands: BTreeMap<String, BTreeSet<String>>,
    word_patterns: Vec<(String, Regex)>,
}

/// The accepted document shapes, resolved once at load time.
enum CatalogSource {
    Wrapped(Map<String, Value>),
    Flat(Map<String, Value>),
    Records(Vec<Value>),
}

impl CatalogSource {
    fn classify(value: Value) -> Result<Self, ReferenceLoadError> {
        match value {
            Value::Object(mut map) => match map.remove("marcas") {
                Some(Value::Object(inner)) => Ok(Self::Wrapped(inner)),
                Some(other) => {
                    // a brand that happens to be called "marcas"
                    map.insert("marcas".to_string(), other);
                    Ok(Self::Flat(map))
                }
                None => Ok(Self::Flat(map)),
            },
            Value::Array(items) => Ok(Self::Records(items)),
            _ => Err(ReferenceLoadError::Unrecognized(
                "expected an object of brands or a list of brand records",
            )),
        }
    }

    fn into_entries(self) -> Vec<(String, Vec<String>)> {
        match self {
            Self::Wrapped(map) | Self::Flat(map) => map
                .into_iter()
                .map(|(brand, models)| (brand, model_names(&models)))
                .collect(),
            Self::Records(items) => items
                .iter()
                .filter_map(|item| {
                    let record = item.as_object()?;
                    let brand = ["marca", "brand", "name"]
                        .iter()
                        .find_map(|key| record.get(*key).and_then(scalar_text))?;
                    let models = ["modelos", "models"]
                        .iter()
                        .find_map(|key| record.get(*key))
                        .map(model_names)
                        .unwrap_or_default();
                    Some((brand, models))
                })
                .collect(),
        }
    }
}

fn model_names(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

impl ReferenceCatalog {
    pub fn load_path(path: &Path) -> Result<Self, ReferenceLoadError> {
        if !path.is_file() {
            return Err(ReferenceLoadError::Missing(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path).map_err(|source| ReferenceLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            brands = catalog.brand_count(),
            models = catalog.model_count(),
            "loaded reference catalog"
        );
        Ok(catalog)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ReferenceLoadError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ReferenceLoadError> {
        let source = CatalogSource::classify(value)?;
        let mut brands: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (brand, models) in source.into_entries() {
            let brand = fold_key(&brand);
            if brand.is_empty() {
                debug!("skipping catalog entry without a brand name");
                continue;
            }
            brands.entry(brand).or_default().extend(
                models
                    .iter()
                    .map(|model| fold_key(model))
                    .filter(|model| !model.is_empty()),
            );
        }
        Ok(Self::from_brands(brands))
    }

    fn from_brands(brands: BTreeMap<String, BTreeSet<String>>) -> Self {
        let mut names = brands.keys().cloned().collect::<Vec<_>>();
        names.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        let word_patterns = names
            .into_iter()
            .filter_map(|name| {
                match Regex::new(&format!(r"\b{}\b", regex::escape(&name))) {
                    Ok(pattern) => Some((name, pattern)),
                    Err(err) => {
                        warn!(brand = %name, error = %err, "brand left out of word matching");
                        None
                    }
                }
            })
            .collect();
        Self {
            brands,
            word_patterns,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
    }

    pub fn brand_count(&self) -> usize {
        self.brands.len()
    }

    pub fn model_count(&self) -> usize {
        self.brands.values().map(BTreeSet::len).sum()
    }

    pub fn contains_brand(&self, brand: &str) -> bool {
        self.brands.contains_key(&fold_key(brand))
    }

    pub fn models(&self, brand: &str) -> Option<&BTreeSet<String>> {
        self.brands.get(&fold_key(brand))
    }

    /// Resolves a cell to a brand key.
    ///
    /// An exact match always wins; in word mode the longest brand found as a
    /// whole word comes next.
    pub fn find_brand(&self, cell: &str, mode: BrandMatch) -> Option<&str> {
        let folded = fold_key(cell);
        if folded.is_empty() {
            return None;
        }
        if let Some((brand, _)) = self.brands.get_key_value(&folded) {
            return Some(brand.as_str());
        }
        if mode == BrandMatch::Word {
            return self
                .word_patterns
                .iter()
                .find(|(_, pattern)| pattern.is_match(&folded))
                .map(|(brand, _)| brand.as_str());
        }
        None
    }

    pub fn find_model(&self, brand: &str, cell: &str) -> Option<&str> {
        let models = self.brands.get(brand)?;
        let folded = fold_key(cell);
        if folded.is_empty() {
            return None;
        }
        models.get(&folded).map(String::as_str)
    }
}
