//! Text-to-cell association
//!
//! Text runs arrive in the PDF's bottom-up coordinate system while cells are
//! laid out top-down over the raster. Runs must be flipped exactly once with
//! [`to_top_down`] before any containment test, otherwise every run lands in
//! the mirrored row.

use crate::extractor::TextRun;
use crate::grid::Rect;
use std::cmp::Ordering;

/// Flip bottom-up runs into top-down space: y' = page_height - y
pub fn to_top_down(runs: &[TextRun], page_height: f32) -> Vec<TextRun> {
    runs.iter()
        .map(|run| TextRun {
            y: page_height - run.y,
            ..run.clone()
        })
        .collect()
}

/// Runs whose anchor lies in `rect` (half-open), largest font first.
/// Equal weights keep top-to-bottom order.
pub fn runs_in_rect(runs: &[TextRun], rect: &Rect) -> Vec<TextRun> {
    let mut inside: Vec<TextRun> = runs
        .iter()
        .filter(|run| rect.contains(run.x, run.y))
        .cloned()
        .collect();
    sort_by_weight(&mut inside);
    inside
}

/// Largest font first; equal weights top to bottom
pub fn sort_by_weight(runs: &mut [TextRun]) {
    runs.sort_by(|a, b| {
        b.font_weight
            .total_cmp(&a.font_weight)
            .then_with(|| a.y.total_cmp(&b.y))
    });
}

/// Sort into reading order: top to bottom, then left to right
pub fn reading_order(runs: &[TextRun]) -> Vec<TextRun> {
    let mut ordered = runs.to_vec();
    ordered.sort_by(|a, b| match a.y.total_cmp(&b.y) {
        Ordering::Equal => a.x.total_cmp(&b.x),
        other => other,
    });
    ordered
}

/// A line of text (grouped runs)
#[derive(Debug, Clone)]
pub struct TextLine {
    pub runs: Vec<TextRun>,
    pub y: f32,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.runs
            .iter()
            .map(|r| r.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Group top-down runs into lines. Runs are taken in reading order and a run
/// joins the current line when its y is within `y_tolerance` of the previous
/// run; runs inside a line are ordered left to right.
pub fn group_into_lines(runs: &[TextRun], y_tolerance: f32) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();
    let mut last_y: Option<f32> = None;

    for run in reading_order(runs) {
        let y = run.y;
        match (lines.last_mut(), last_y) {
            (Some(line), Some(prev)) if (y - prev).abs() < y_tolerance => line.runs.push(run),
            _ => lines.push(TextLine { runs: vec![run], y }),
        }
        last_y = Some(y);
    }

    for line in &mut lines {
        line.runs.sort_by(|a, b| a.x.total_cmp(&b.x));
    }
    lines
}
