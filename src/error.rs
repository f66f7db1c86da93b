use std::path::PathBuf;

use thiserror::Error;

/// The reference catalog could not be turned into a brand/model lookup.
#[derive(Debug, Error)]
pub enum ReferenceLoadError {
    #[error("reference catalog not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to read reference catalog {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse reference catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unrecognized reference catalog shape: {0}")]
    Unrecognized(&'static str),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no tables to assemble")]
pub struct EmptyInputError;

/// Failure confined to a single image of a batch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PageError {
    #[error("OCR produced no usable output")]
    NoText,
    #[error("bounding box {index} has no usable top-left corner")]
    MalformedBox { index: usize },
    #[error("line gap must be a non-negative number, got {0}")]
    InvalidLineGap(f64),
    #[error("cut position must be a finite number, got {0}")]
    InvalidCut(f64),
    #[error("failed to decode OCR result: {0}")]
    Decode(String),
}
