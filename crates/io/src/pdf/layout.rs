//! Table reconstruction from positioned text.
//!
//! Pure geometry: fragments in, [`RawTable`] out. Lines come from clustering
//! Y coordinates, columns from clustering X coordinates across every line.

use serde::{Deserialize, Serialize};

use crate::error::FormatError;
use crate::table::RawTable;

/// A run of text at a position. `y` grows downward; pages are stacked so
/// `y` is unique across the document.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub x: f64,
    pub y: f64,
    /// Rendered glyph height.
    pub height: f64,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, x: f64, y: f64, height: f64) -> Self {
        Self { text: text.into(), x, y, height }
    }
}

/// Fixed overrides for the clustering bands. `None` derives the band from
/// the document's median glyph height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfLayoutOptions {
    pub line_tolerance: Option<f64>,
    pub column_tolerance: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub line: f64,
    pub column: f64,
}

const LINE_FACTOR: f64 = 0.5;
const COLUMN_FACTOR: f64 = 2.0;
const FALLBACK_LINE: f64 = 3.0;
const FALLBACK_COLUMN: f64 = 20.0;

pub const SPOT_CHECK_WARNING: &str =
    "PDF table structure was reconstructed from text positions and may not be exact; spot-check the parsed rows";

impl Tolerances {
    pub fn resolve(fragments: &[TextFragment], opts: &PdfLayoutOptions) -> Self {
        let median = median_height(fragments);
        let line = opts
            .line_tolerance
            .or_else(|| median.map(|h| h * LINE_FACTOR))
            .unwrap_or(FALLBACK_LINE);
        let column = opts
            .column_tolerance
            .or_else(|| median.map(|h| h * COLUMN_FACTOR))
            .unwrap_or(FALLBACK_COLUMN);
        Self { line, column }
    }
}

fn median_height(fragments: &[TextFragment]) -> Option<f64> {
    let mut heights: Vec<f64> = fragments
        .iter()
        .map(|f| f.height)
        .filter(|h| h.is_finite() && *h > 0.0)
        .collect();
    if heights.is_empty() {
        return None;
    }
    heights.sort_by(|a, b| a.total_cmp(b));
    Some(heights[heights.len() / 2])
}

/// Rebuild a table. The first reconstructed row is the header; later rows
/// identical to it (repeated page headers) are dropped.
pub fn reconstruct(fragments: Vec<TextFragment>, opts: &PdfLayoutOptions) -> Result<RawTable, FormatError> {
    let fragments: Vec<TextFragment> = fragments
        .into_iter()
        .filter(|f| !f.text.trim().is_empty())
        .collect();
    if fragments.is_empty() {
        return Err(FormatError::ScannedPdf);
    }

    let tol = Tolerances::resolve(&fragments, opts);
    log::debug!("pdf layout: line band {:.2}, column band {:.2}", tol.line, tol.column);

    let lines = group_lines(fragments, tol.line);
    let columns = cluster_columns(&lines, tol.column);

    let mut grid: Vec<Vec<String>> = lines
        .iter()
        .map(|line| {
            let mut cells = vec![String::new(); columns.len()];
            for frag in line {
                let col = nearest_column(&columns, frag.x);
                let cell = &mut cells[col];
                if !cell.is_empty() {
                    cell.push(' ');
                }
                cell.push_str(frag.text.trim());
            }
            cells
        })
        .collect();

    if grid.len() < 2 {
        return Err(FormatError::NoTableFound { rows: grid.len() });
    }

    let headers = grid.remove(0);
    let mut table = RawTable::new(headers);
    let mut repeated = 0usize;
    for (idx, cells) in grid.into_iter().enumerate() {
        if cells == table.headers {
            repeated += 1;
            continue;
        }
        // header is line 1
        table.push_padded(idx + 2, cells);
    }

    if table.rows.is_empty() {
        return Err(FormatError::NoTableFound { rows: 1 });
    }
    if repeated > 0 {
        log::debug!("pdf layout: dropped {repeated} repeated header row(s)");
    }

    table.warnings.push(SPOT_CHECK_WARNING.to_string());
    Ok(table)
}

/// Sort top-down and start a new line whenever a fragment's Y leaves the
/// band around the current line's mean Y. Each line is sorted by X.
fn group_lines(mut fragments: Vec<TextFragment>, tolerance: f64) -> Vec<Vec<TextFragment>> {
    fragments.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<Vec<TextFragment>> = Vec::new();
    let mut mean_y = f64::NAN;

    for frag in fragments {
        match lines.last_mut() {
            Some(line) if (frag.y - mean_y).abs() <= tolerance => {
                let n = line.len() as f64;
                mean_y = (mean_y * n + frag.y) / (n + 1.0);
                line.push(frag);
            }
            _ => {
                mean_y = frag.y;
                lines.push(vec![frag]);
            }
        }
    }

    for line in &mut lines {
        line.sort_by(|a, b| a.x.total_cmp(&b.x));
    }
    lines
}

/// Cluster left edges across all lines; returns ascending cluster centres.
fn cluster_columns(lines: &[Vec<TextFragment>], tolerance: f64) -> Vec<f64> {
    let mut xs: Vec<f64> = lines.iter().flatten().map(|f| f.x).collect();
    xs.sort_by(|a, b| a.total_cmp(b));

    let mut centres: Vec<(f64, usize)> = Vec::new();
    for x in xs {
        match centres.last_mut() {
            Some((mean, n)) if x - *mean <= tolerance => {
                *mean = (*mean * *n as f64 + x) / (*n as f64 + 1.0);
                *n += 1;
            }
            _ => centres.push((x, 1)),
        }
    }
    centres.into_iter().map(|(mean, _)| mean).collect()
}

fn nearest_column(columns: &[f64], x: f64) -> usize {
    columns
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (x - **a).abs().total_cmp(&(x - **b).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
