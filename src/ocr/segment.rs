use crate::error::PageError;
use crate::table::Table;

use super::Line;

/// Turns clustered lines into fixed-width rows.
///
/// Without cuts each fragment gets its own cell and short lines are padded.
/// With cuts a fragment lands in the section counting the cuts strictly left
/// of its `x`, so a fragment sitting on a cut belongs to the section before it.
pub fn segment(lines: &[Line], cuts: Option<&[f64]>) -> Result<Table, PageError> {
    match cuts {
        Some(cuts) if !cuts.is_empty() => segment_by_cuts(lines, cuts),
        _ => Ok(segment_positional(lines)),
    }
}

fn segment_positional(lines: &[Line]) -> Table {
    let width = lines.iter().map(Line::len).max().unwrap_or(0);
    let rows = lines
        .iter()
        .map(|line| {
            let mut row = line.texts().map(str::to_string).collect::<Vec<_>>();
            row.resize(width, String::new());
            row
        })
        .collect();
    Table::new(width, rows)
}

fn segment_by_cuts(lines: &[Line], cuts: &[f64]) -> Result<Table, PageError> {
    let cuts = sorted_cuts(cuts)?;
    let width = cuts.len() + 1;
    let rows = lines
        .iter()
        .map(|line| {
            let mut row = vec![String::new(); width];
            for fragment in &line.fragments {
                if fragment.text.is_empty() {
                    continue;
                }
                let cell = &mut row[section_index(&cuts, fragment.x)];
                if !cell.is_empty() {
                    cell.push(' ');
                }
                cell.push_str(&fragment.text);
            }
            row
        })
        .collect();
    Ok(Table::new(width, rows))
}

pub fn sorted_cuts(cuts: &[f64]) -> Result<Vec<f64>, PageError> {
    if let Some(bad) = cuts.iter().find(|cut| !cut.is_finite()) {
        return Err(PageError::InvalidCut(*bad));
    }
    let mut sorted = cuts.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(sorted)
}

pub fn section_index(sorted_cuts: &[f64], x: f64) -> usize {
    sorted_cuts.partition_point(|cut| *cut < x)
}
