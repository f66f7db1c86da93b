use std::cmp::Ordering;

use serde::Serialize;

use crate::error::PageError;

use super::Fragment;

pub const DEFAULT_LINE_GAP: f64 = 6.5;

/// Fragments sharing one reading band, left to right.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub fragments: Vec<Fragment>,
}

impl Line {
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> + '_ {
        self.fragments.iter().map(|fragment| fragment.text.as_str())
    }
}

/// Groups fragments into top-to-bottom lines.
///
/// The gap is measured between consecutive fragments in `(y, x)` order, so a
/// band may drift as long as each step stays within `line_gap`.
pub fn cluster(mut fragments: Vec<Fragment>, line_gap: f64) -> Result<Vec<Line>, PageError> {
    if !line_gap.is_finite() || line_gap < 0.0 {
        return Err(PageError::InvalidLineGap(line_gap));
    }
    fragments.sort_by(reading_order);

    let mut lines: Vec<Line> = Vec::new();
    let mut current: Vec<Fragment> = Vec::new();
    let mut last_y: Option<f64> = None;

    for fragment in fragments {
        let joins = match last_y {
            Some(prev) => (fragment.y - prev).abs() <= line_gap,
            None => true,
        };
        last_y = Some(fragment.y);
        if !joins {
            lines.push(close_line(std::mem::take(&mut current)));
        }
        current.push(fragment);
    }
    if !current.is_empty() {
        lines.push(close_line(current));
    }

    Ok(lines)
}

fn close_line(mut fragments: Vec<Fragment>) -> Line {
    fragments.sort_by(|a, b| a.x.total_cmp(&b.x));
    Line { fragments }
}

fn reading_order(a: &Fragment, b: &Fragment) -> Ordering {
    a.y.total_cmp(&b.y)
        .then_with(|| a.x.total_cmp(&b.x))
        .then_with(|| a.text.cmp(&b.text))
}
