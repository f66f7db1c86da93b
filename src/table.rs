use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::EmptyInputError;

pub const DERIVED_COLUMNS: [&str; 4] = ["marca", "modelo", "año", "version"];

/// Rows of one image, every row exactly `width` cells wide.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    width: usize,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(width: usize, mut rows: Vec<Vec<String>>) -> Self {
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self { width, rows }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A table row widened with the propagated catalog fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichedRow {
    pub marca: Option<String>,
    pub modelo: Option<String>,
    #[serde(rename = "año")]
    pub anio: Option<String>,
    pub version: Option<String>,
    pub sections: Vec<String>,
}

impl EnrichedRow {
    pub fn is_blank(&self) -> bool {
        [&self.marca, &self.modelo, &self.anio, &self.version]
            .into_iter()
            .all(|value| is_blank(value.as_deref()))
            && self.sections.iter().all(|cell| is_blank(Some(cell)))
    }

    fn cells(&self, width: usize) -> Vec<Option<String>> {
        let mut cells = vec![
            self.marca.clone(),
            self.modelo.clone(),
            self.anio.clone(),
            self.version.clone(),
        ];
        cells.extend(
            (0..width).map(|idx| Some(self.sections.get(idx).cloned().unwrap_or_default())),
        );
        cells
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|text| text.trim().is_empty())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedTable {
    pub width: usize,
    pub rows: Vec<EnrichedRow>,
}

/// All images of a batch, in caller order, without blank rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidatedTable {
    width: usize,
    rows: Vec<EnrichedRow>,
}

impl ConsolidatedTable {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> &[EnrichedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn header(&self) -> Vec<String> {
        DERIVED_COLUMNS
            .iter()
            .map(|name| name.to_string())
            .chain((0..self.width).map(|idx| format!("col_{}", idx)))
            .collect()
    }

    /// Row-major cells matching [`ConsolidatedTable::header`].
    pub fn records(&self) -> Vec<Vec<Option<String>>> {
        self.rows.iter().map(|row| row.cells(self.width)).collect()
    }
}

impl Serialize for ConsolidatedTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ConsolidatedTable", 2)?;
        state.serialize_field("header", &self.header())?;
        state.serialize_field("rows", &self.records())?;
        state.end()
    }
}

/// Concatenates per-image tables in the given order and drops blank rows.
///
/// Tables of different widths are right-padded to the widest one.
pub fn assemble(tables: Vec<EnrichedTable>) -> Result<ConsolidatedTable, EmptyInputError> {
    if tables.is_empty() {
        return Err(EmptyInputError);
    }
    let width = tables.iter().map(|table| table.width).max().unwrap_or(0);
    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for table in tables {
        for mut row in table.rows {
            if row.is_blank() {
                dropped += 1;
                continue;
            }
            row.sections.resize(width, String::new());
            rows.push(row);
        }
    }
    debug!(kept = rows.len(), dropped, "assembled consolidated table");
    Ok(ConsolidatedTable { width, rows })
}
