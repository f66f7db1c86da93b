pub mod cluster;
pub mod segment;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PageError;
use crate::normalize::Normalizer;

pub use cluster::{DEFAULT_LINE_GAP, Line, cluster};
pub use segment::segment;

/// One recognized text span anchored at the top-left corner of its box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

impl Fragment {
    pub fn new(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
        }
    }
}

/// Bounding box as emitted by the recognizer: either `[x_min, y_min, x_max, y_max]`
/// or a polygon of `[x, y]` points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OcrBox {
    Flat(Vec<f64>),
    Polygon(Vec<[f64; 2]>),
}

impl OcrBox {
    fn top_left(&self) -> Option<(f64, f64)> {
        let (x, y) = match self {
            OcrBox::Flat(values) => match values.as_slice() {
                [x, y, ..] => (*x, *y),
                _ => return None,
            },
            OcrBox::Polygon(points) => {
                if points.is_empty() {
                    return None;
                }
                points.iter().fold((f64::INFINITY, f64::INFINITY), |acc, p| {
                    (acc.0.min(p[0]), acc.1.min(p[1]))
                })
            }
        };
        if x.is_finite() && y.is_finite() {
            Some((x, y))
        } else {
            None
        }
    }
}

/// Per-image recognizer output: parallel lists of texts and boxes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrPage {
    #[serde(default)]
    pub rec_texts: Vec<Option<String>>,
    #[serde(default)]
    pub rec_boxes: Vec<OcrBox>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OcrDocument {
    Wrapped { res: OcrPage },
    Bare(OcrPage),
}

impl OcrPage {
    pub fn from_json(raw: &str) -> Result<Self, PageError> {
        let document: OcrDocument =
            serde_json::from_str(raw).map_err(|err| PageError::Decode(err.to_string()))?;
        Ok(match document {
            OcrDocument::Wrapped { res } => res,
            OcrDocument::Bare(page) => page,
        })
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, PageError> {
        let document: OcrDocument =
            serde_json::from_value(value).map_err(|err| PageError::Decode(err.to_string()))?;
        Ok(match document {
            OcrDocument::Wrapped { res } => res,
            OcrDocument::Bare(page) => page,
        })
    }

    pub fn fragments(&self, normalizer: &Normalizer) -> Result<Vec<Fragment>, PageError> {
        if self.rec_texts.is_empty() || self.rec_boxes.is_empty() {
            return Err(PageError::NoText);
        }
        if self.rec_texts.len() != self.rec_boxes.len() {
            warn!(
                texts = self.rec_texts.len(),
                boxes = self.rec_boxes.len(),
                "OCR texts and boxes differ in length; extra entries ignored"
            );
        }

        let mut fragments = Vec::with_capacity(self.rec_texts.len().min(self.rec_boxes.len()));
        for (index, (text, bbox)) in self.rec_texts.iter().zip(&self.rec_boxes).enumerate() {
            let (x, y) = bbox.top_left().ok_or(PageError::MalformedBox { index })?;
            let text = normalizer
                .normalize_opt(text.as_deref())
                .unwrap_or_default();
            fragments.push(Fragment { text, x, y });
        }
        Ok(fragments)
    }
}
