use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::table::ConsolidatedTable;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Tsv,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "tsv" => Ok(Self::Tsv),
            other => Err(anyhow!("unsupported output format: {}", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Tsv => f.write_str("tsv"),
        }
    }
}

pub fn render(table: &ConsolidatedTable, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(table),
        OutputFormat::Tsv => Ok(to_tsv(table)),
    }
}

/// `{"header": [...], "rows": [[...], ...]}`, pretty printed.
pub fn to_json(table: &ConsolidatedTable) -> Result<String> {
    let mut out = serde_json::to_string_pretty(table)?;
    out.push('\n');
    Ok(out)
}

/// Header line then one line per row; missing values are empty cells.
pub fn to_tsv(table: &ConsolidatedTable) -> String {
    let mut out = String::new();
    push_line(&mut out, table.header().iter().map(String::as_str));
    for record in table.records() {
        push_line(&mut out, record.iter().map(|cell| cell.as_deref().unwrap_or("")));
    }
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for cell in cells {
        if !first {
            out.push('\t');
        }
        first = false;
        out.extend(
            cell.chars()
                .map(|ch| if matches!(ch, '\t' | '\n' | '\r') { ' ' } else { ch }),
        );
    }
    out.push('\n');
}
