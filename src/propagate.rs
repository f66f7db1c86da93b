use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::catalog::{BrandMatch, ReferenceCatalog};
use crate::normalize::fold_key;
use crate::table::{EnrichedRow, EnrichedTable, Table};

static YEAR_QUARTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([0-9]{4})Q[0-9]+").expect("valid regex"));
static YEAR_WITH_REST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{4})\s+(.+)$").expect("valid regex"));
static YEAR_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{4})$").expect("valid regex"));

/// Which pass decides the `modelo` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    Catalog,
    Heuristic,
    /// Catalog model when there is one, heuristic model otherwise.
    #[default]
    Combined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationOptions {
    /// Columns scanned, in order, for brand and model names.
    pub search_columns: Vec<usize>,
    /// Column holding year headers; clamped to the last column of narrower rows.
    pub year_column: usize,
    pub model_source: ModelSource,
    pub brand_match: BrandMatch,
    /// Longest remainder, in words, still read as a model label.
    pub short_model_words: usize,
}

impl Default for PropagationOptions {
    fn default() -> Self {
        Self {
            search_columns: vec![0, 1, 2, 3],
            year_column: 1,
            model_source: ModelSource::default(),
            brand_match: BrandMatch::default(),
            short_model_words: 3,
        }
    }
}

/// Brand/model context carried from one row to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogState {
    pub brand: Option<String>,
    pub model: Option<String>,
}

impl CatalogState {
    /// Applies one row: a newly detected brand clears the model unless it
    /// repeats the current brand; an undetected model keeps the previous one.
    pub fn advance(
        self,
        row: &[String],
        catalog: &ReferenceCatalog,
        columns: &[usize],
        mode: BrandMatch,
    ) -> Self {
        let mut next = self;
        if let Some(brand) = scan_row(row, columns, |cell| catalog.find_brand(cell, mode)) {
            if next.brand.as_deref() != Some(brand) {
                debug!(brand, "brand changed");
                next.model = None;
                next.brand = Some(brand.to_string());
            }
        }
        let model = next.brand.as_deref().and_then(|brand| {
            scan_row(row, columns, |cell| catalog.find_model(brand, cell)).map(str::to_string)
        });
        if let Some(model) = model {
            if next.model.as_deref() != Some(model.as_str()) {
                debug!(model = %model, "model changed");
            }
            next.model = Some(model);
        }
        next
    }
}

fn scan_row<'c, F>(row: &[String], columns: &[usize], mut find: F) -> Option<&'c str>
where
    F: FnMut(&str) -> Option<&'c str>,
{
    columns
        .iter()
        .filter_map(|idx| row.get(*idx))
        .find_map(|cell| find(cell.as_str()))
}

/// A year marker split off the front of a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearSplit {
    pub year: Option<String>,
    pub rest: String,
}

/// Tries, in order: `2024Q1` (quarter dropped), `2024 text`, bare `2024`.
pub fn split_year(text: &str) -> YearSplit {
    let trimmed = text.trim();
    if let Some(caps) = YEAR_QUARTER.captures(trimmed) {
        return YearSplit {
            year: Some(caps[1].to_string()),
            rest: String::new(),
        };
    }
    if let Some(caps) = YEAR_WITH_REST.captures(trimmed) {
        return YearSplit {
            year: Some(caps[1].to_string()),
            rest: caps[2].trim().to_string(),
        };
    }
    if let Some(caps) = YEAR_ONLY.captures(trimmed) {
        return YearSplit {
            year: Some(caps[1].to_string()),
            rest: String::new(),
        };
    }
    YearSplit {
        year: None,
        rest: text.to_string(),
    }
}

/// Year and free-text model context used when the catalog has no answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeuristicState {
    pub year: Option<String>,
    pub model: Option<String>,
}

/// Walks a table top to bottom, filling brand, model, year and version.
pub struct Propagator<'a> {
    catalog: &'a ReferenceCatalog,
    options: &'a PropagationOptions,
    catalog_state: CatalogState,
    heuristic: HeuristicState,
}

impl<'a> Propagator<'a> {
    pub fn new(catalog: &'a ReferenceCatalog, options: &'a PropagationOptions) -> Self {
        Self {
            catalog,
            options,
            catalog_state: CatalogState::default(),
            heuristic: HeuristicState::default(),
        }
    }

    pub fn step(&mut self, row: &[String]) -> EnrichedRow {
        let source = self.options.model_source;
        let previous_brand = self.catalog_state.brand.clone();
        self.catalog_state = std::mem::take(&mut self.catalog_state).advance(
            row,
            self.catalog,
            &self.options.search_columns,
            self.options.brand_match,
        );
        if self.catalog_state.brand != previous_brand {
            self.heuristic.model = None;
        }

        let split = split_year(year_cell(row, self.options.year_column));
        if split.year.is_some() {
            self.heuristic.year = split.year.clone();
        }
        let rest = self.meaningful_rest(split.rest);

        let catalog_model = match source {
            ModelSource::Heuristic => None,
            ModelSource::Catalog | ModelSource::Combined => self.catalog_state.model.clone(),
        };
        let (modelo, version) = match (catalog_model, source) {
            (Some(model), _) => {
                let version = rest.filter(|text| fold_key(text) != model);
                (Some(model), version)
            }
            (None, ModelSource::Catalog) => (None, rest),
            (None, _) => self.heuristic_model(split.year.is_some(), rest),
        };

        EnrichedRow {
            marca: self.catalog_state.brand.clone(),
            modelo,
            anio: self.heuristic.year.clone(),
            version,
            sections: row.to_vec(),
        }
    }

    fn meaningful_rest(&self, rest: String) -> Option<String> {
        let rest = rest.trim();
        if rest.is_empty() {
            return None;
        }
        // the brand header itself is not a model or version
        if self.catalog_state.brand.as_deref() == Some(fold_key(rest).as_str()) {
            return None;
        }
        Some(rest.to_string())
    }

    fn heuristic_model(
        &mut self,
        has_year: bool,
        rest: Option<String>,
    ) -> (Option<String>, Option<String>) {
        let Some(rest) = rest else {
            if has_year {
                // a bare year header closes the previous model
                self.heuristic.model = None;
            }
            return (self.heuristic.model.clone(), None);
        };
        let words = rest.split_whitespace().count();
        if self.heuristic.model.is_none() && words <= self.options.short_model_words {
            debug!(model = %rest, "model label");
            self.heuristic.model = Some(rest);
            return (self.heuristic.model.clone(), None);
        }
        (self.heuristic.model.clone(), Some(rest))
    }
}

fn year_cell(row: &[String], year_column: usize) -> &str {
    if row.is_empty() {
        return "";
    }
    row[year_column.min(row.len() - 1)].as_str()
}

/// Enriches every row of `table`, in order, with the propagated fields.
pub fn propagate(
    table: &Table,
    catalog: &ReferenceCatalog,
    options: &PropagationOptions,
) -> EnrichedTable {
    let mut propagator = Propagator::new(catalog, options);
    let rows = table
        .rows()
        .iter()
        .map(|row| propagator.step(row))
        .collect();
    EnrichedTable {
        width: table.width(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(rows: &[&[&str]]) -> Table {
        let width = rows.iter().map(|row| row.len()).max().unwrap_or(0);
        Table::new(
            width,
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    fn column<'t>(
        table: &'t EnrichedTable,
        pick: fn(&EnrichedRow) -> &Option<String>,
    ) -> Vec<Option<&'t str>> {
        table.rows.iter().map(|row| pick(row).as_deref()).collect()
    }

    fn catalog() -> ReferenceCatalog {
        ReferenceCatalog::from_value(json!({
            "Ford": ["Ranger", "Territory"],
            "Chevrolet": ["Onix", "Tracker"]
        }))
        .expect("catalog")
    }

    #[test]
    fn split_year_patterns() {
        assert_eq!(
            split_year("2023Q2"),
            YearSplit { year: Some("2023".into()), rest: String::new() }
        );
        assert_eq!(
            split_year("2024 5p Dynamic AT"),
            YearSplit { year: Some("2024".into()), rest: "5p Dynamic AT".into() }
        );
        assert_eq!(
            split_year(" 2024 "),
            YearSplit { year: Some("2024".into()), rest: String::new() }
        );
        assert_eq!(
            split_year("Ranger XLT"),
            YearSplit { year: None, rest: "Ranger XLT".into() }
        );
        assert_eq!(split_year("20245").year, None);
        assert_eq!(split_year("").year, None);
    }

    #[test]
    fn brand_fills_down() {
        let enriched = propagate(
            &table(&[&["FORD"], &[""], &["precio"]]),
            &catalog(),
            &PropagationOptions::default(),
        );
        assert_eq!(
            column(&enriched, |row| &row.marca),
            vec![Some("FORD"), Some("FORD"), Some("FORD")]
        );
    }

    #[test]
    fn nothing_before_the_first_brand() {
        let enriched = propagate(
            &table(&[&["intro"], &["ford"]]),
            &catalog(),
            &PropagationOptions::default(),
        );
        assert_eq!(column(&enriched, |row| &row.marca), vec![None, Some("FORD")]);
    }

    #[test]
    fn model_resets_on_brand_change_only() {
        let options = PropagationOptions {
            model_source: ModelSource::Catalog,
            ..PropagationOptions::default()
        };
        let enriched = propagate(
            &table(&[
                &["FORD", ""],
                &["", "Ranger"],
                &["FORD", ""],
                &["", "detalle"],
                &["CHEVROLET", ""],
                &["", "detalle"],
            ]),
            &catalog(),
            &options,
        );
        assert_eq!(
            column(&enriched, |row| &row.modelo),
            vec![None, Some("RANGER"), Some("RANGER"), Some("RANGER"), None, None]
        );
        assert_eq!(
            column(&enriched, |row| &row.marca),
            vec![
                Some("FORD"),
                Some("FORD"),
                Some("FORD"),
                Some("FORD"),
                Some("CHEVROLET"),
                Some("CHEVROLET")
            ]
        );
    }

    #[test]
    fn models_only_match_under_their_brand() {
        let enriched = propagate(
            &table(&[&["CHEVROLET", ""], &["", "Ranger"], &["", "onix"]]),
            &catalog(),
            &PropagationOptions {
                model_source: ModelSource::Catalog,
                ..PropagationOptions::default()
            },
        );
        assert_eq!(
            column(&enriched, |row| &row.modelo),
            vec![None, None, Some("ONIX")]
        );
    }

    #[test]
    fn catalog_state_steps_in_isolation() {
        let catalog = catalog();
        let columns = [0usize];
        let row = |text: &str| vec![text.to_string()];
        let state = CatalogState::default()
            .advance(&row("Ford"), &catalog, &columns, BrandMatch::Exact)
            .advance(&row("Territory"), &catalog, &columns, BrandMatch::Exact);
        assert_eq!(
            state,
            CatalogState {
                brand: Some("FORD".into()),
                model: Some("TERRITORY".into())
            }
        );
        let same = state
            .clone()
            .advance(&row("FORD"), &catalog, &columns, BrandMatch::Exact);
        assert_eq!(same, state);
        let changed = state.advance(&row("Chevrolet"), &catalog, &columns, BrandMatch::Exact);
        assert_eq!(changed.model, None);
    }

    #[test]
    fn year_and_model_heuristic_without_catalog() {
        let enriched = propagate(
            &table(&[&["2024"], &["Ranger"], &["XLT"]]),
            &ReferenceCatalog::default(),
            &PropagationOptions::default(),
        );
        assert_eq!(
            column(&enriched, |row| &row.anio),
            vec![Some("2024"), Some("2024"), Some("2024")]
        );
        assert_eq!(
            column(&enriched, |row| &row.modelo),
            vec![None, Some("Ranger"), Some("Ranger")]
        );
        assert_eq!(
            column(&enriched, |row| &row.version),
            vec![None, None, Some("XLT")]
        );
    }

    #[test]
    fn long_remainders_are_versions_and_year_headers_close_models() {
        let enriched = propagate(
            &table(&[
                &["", "2024"],
                &["", "Territory"],
                &["", "2024 Titanium 1.5 AT Hybrid"],
                &["", "2023Q4"],
                &["", "Ranger Raptor"],
            ]),
            &ReferenceCatalog::default(),
            &PropagationOptions::default(),
        );
        assert_eq!(
            column(&enriched, |row| &row.modelo),
            vec![None, Some("Territory"), Some("Territory"), None, Some("Ranger Raptor")]
        );
        assert_eq!(
            column(&enriched, |row| &row.version),
            vec![None, None, Some("Titanium 1.5 AT Hybrid"), None, None]
        );
        assert_eq!(
            column(&enriched, |row| &row.anio),
            vec![Some("2024"), Some("2024"), Some("2024"), Some("2023"), Some("2023")]
        );
    }

    #[test]
    fn combined_mode_prefers_catalog_models() {
        let enriched = propagate(
            &table(&[
                &["FORD", "2024"],
                &["", "Ranger"],
                &["", "XLS 4x2 MT Diesel"],
                &["CHEVROLET", ""],
                &["", "Montana"],
            ]),
            &catalog(),
            &PropagationOptions::default(),
        );
        assert_eq!(
            column(&enriched, |row| &row.modelo),
            vec![None, Some("RANGER"), Some("RANGER"), None, Some("Montana")]
        );
        assert_eq!(
            column(&enriched, |row| &row.version),
            vec![None, None, Some("XLS 4x2 MT Diesel"), None, None]
        );
    }

    #[test]
    fn heuristic_mode_ignores_catalog_models() {
        let enriched = propagate(
            &table(&[&["FORD", ""], &["", "Ranger"], &["", "Territory"]]),
            &catalog(),
            &PropagationOptions {
                model_source: ModelSource::Heuristic,
                ..PropagationOptions::default()
            },
        );
        assert_eq!(
            column(&enriched, |row| &row.modelo),
            vec![None, Some("Ranger"), Some("Ranger")]
        );
        // a second short label inside one block reads as a version of the first
        assert_eq!(
            column(&enriched, |row| &row.version),
            vec![None, None, Some("Territory")]
        );
        assert_eq!(
            column(&enriched, |row| &row.marca),
            vec![Some("FORD"), Some("FORD"), Some("FORD")]
        );
    }

    #[test]
    fn word_mode_finds_brands_inside_cells() {
        let enriched = propagate(
            &table(&[&["Lista FORD 2024"], &["Ranger"]]),
            &catalog(),
            &PropagationOptions {
                brand_match: BrandMatch::Word,
                model_source: ModelSource::Catalog,
                ..PropagationOptions::default()
            },
        );
        assert_eq!(
            column(&enriched, |row| &row.marca),
            vec![Some("FORD"), Some("FORD")]
        );
        assert_eq!(column(&enriched, |row| &row.modelo), vec![None, Some("RANGER")]);
    }

    #[test]
    fn rows_keep_their_sections() {
        let enriched = propagate(
            &table(&[&["a", "b", "c"]]),
            &ReferenceCatalog::default(),
            &PropagationOptions::default(),
        );
        assert_eq!(enriched.width, 3);
        assert_eq!(enriched.rows[0].sections, vec!["a", "b", "c"]);
    }
}
