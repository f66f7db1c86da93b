use serde::{Deserialize, Serialize};

use crate::table::ConsolidatedTable;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct ProcessRequest {
    pub(crate) pages: Vec<PageRequest>,
    pub(crate) line_gap: Option<f64>,
    pub(crate) cuts: Option<Vec<f64>>,
    /// Inline catalog replacing the server's one for this request.
    pub(crate) catalog: Option<serde_json::Value>,
    pub(crate) workers: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageRequest {
    pub(crate) id: String,
    pub(crate) ocr: serde_json::Value,
    #[serde(default)]
    pub(crate) cuts: Option<Vec<f64>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProcessResponse {
    pub(crate) pages: Vec<PageSummary>,
    pub(crate) table: ConsolidatedTable,
}

#[derive(Debug, Serialize)]
pub(crate) struct PageSummary {
    pub(crate) id: String,
    pub(crate) success: bool,
    pub(crate) rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
