//! Field extraction
//!
//! Turns the text runs associated with one candidate region into a product
//! name, a specs block, a specs list and inferred categories. Picking the
//! name is a heuristic and sits behind [`TitleSelectionStrategy`]; everything
//! else is fixed. All fallbacks derive from the product index, so the same
//! runs and index always give the same fields.

use crate::associate::group_into_lines;
use crate::config::{ExtractionConfig, TitleStrategy};
use crate::extractor::TextRun;
use crate::rules::{infer_categories, Categories};

pub const SPECS_PLACEHOLDER: &str = "Specification info";
pub const DEFAULT_VOLTAGE: &str = "220V";
pub const DEFAULT_CRI: &str = "90+";

/// The chosen product name and the runs it was built from
#[derive(Debug, Clone, PartialEq)]
pub struct TitleChoice {
    pub name: String,
    /// Indices into the input runs; these are left out of the specs
    pub consumed: Vec<usize>,
}

/// Heuristic that names a product from its caption runs
pub trait TitleSelectionStrategy: Send + Sync {
    /// `None` when no run qualifies; the caller then uses a placeholder
    fn select(&self, runs: &[TextRun], config: &ExtractionConfig) -> Option<TitleChoice>;
}

/// Largest font wins if it is long enough, otherwise the first run that is
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestFontTitle;

impl TitleSelectionStrategy for LargestFontTitle {
    fn select(&self, runs: &[TextRun], config: &ExtractionConfig) -> Option<TitleChoice> {
        let mut largest: Option<usize> = None;
        for (i, run) in runs.iter().enumerate() {
            match largest {
                Some(best) if runs[best].font_weight >= run.font_weight => {}
                _ => largest = Some(i),
            }
        }

        if let Some(i) = largest {
            if char_len(&runs[i].text) > config.min_title_len {
                return Some(single(runs, i));
            }
        }

        runs.iter()
            .position(|r| char_len(&r.text) > config.min_fallback_title_len)
            .map(|i| single(runs, i))
    }
}

/// Top-most run, ties broken left-most
#[derive(Debug, Clone, Copy, Default)]
pub struct TopmostTitle;

impl TitleSelectionStrategy for TopmostTitle {
    fn select(&self, runs: &[TextRun], config: &ExtractionConfig) -> Option<TitleChoice> {
        runs.iter()
            .enumerate()
            .filter(|(_, r)| char_len(&r.text) > config.min_title_len)
            .min_by(|(_, a), (_, b)| a.y.total_cmp(&b.y).then_with(|| a.x.total_cmp(&b.x)))
            .map(|(i, _)| single(runs, i))
    }
}

/// Name from the first caption lines; lines that are mostly digits are
/// model numbers or ratings and stay in the specs
#[derive(Debug, Clone, Copy)]
pub struct CaptionLinesTitle {
    pub y_tolerance: f32,
    /// A line whose digit share exceeds this is a spec line
    pub digit_ratio: f32,
    pub max_lines: usize,
}

impl Default for CaptionLinesTitle {
    fn default() -> Self {
        Self {
            y_tolerance: 25.0,
            digit_ratio: 0.3,
            max_lines: 2,
        }
    }
}

impl CaptionLinesTitle {
    fn is_spec_line(&self, text: &str) -> bool {
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        if chars.is_empty() {
            return true;
        }
        let digits = chars.iter().filter(|c| c.is_ascii_digit()).count();
        digits as f32 / chars.len() as f32 > self.digit_ratio
    }
}

impl TitleSelectionStrategy for CaptionLinesTitle {
    fn select(&self, runs: &[TextRun], config: &ExtractionConfig) -> Option<TitleChoice> {
        let lines = group_into_lines(runs, self.y_tolerance);
        let title_lines: Vec<_> = lines
            .iter()
            .filter(|line| !self.is_spec_line(&line.text()))
            .take(self.max_lines)
            .collect();

        let name = title_lines
            .iter()
            .map(|line| line.text())
            .collect::<Vec<_>>()
            .join(" ");
        if char_len(&name) <= config.min_title_len {
            return None;
        }

        let consumed = runs
            .iter()
            .enumerate()
            .filter(|(_, run)| title_lines.iter().any(|line| line.runs.contains(run)))
            .map(|(i, _)| i)
            .collect();
        Some(TitleChoice { name, consumed })
    }
}

/// Strategy for a configured [`TitleStrategy`]
pub fn strategy_for(kind: TitleStrategy) -> Box<dyn TitleSelectionStrategy> {
    match kind {
        TitleStrategy::LargestFont => Box::new(LargestFontTitle),
        TitleStrategy::Topmost => Box::new(TopmostTitle),
        TitleStrategy::CaptionLines => Box::new(CaptionLinesTitle::default()),
    }
}

/// Fields derived from one region's text
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFields {
    pub name: String,
    pub specs: String,
    pub specs_list: Vec<String>,
    pub categories: Categories,
}

/// Derive all fields for the product with 1-based sequence number `index`.
/// `runs` are expected in association order (largest font first).
pub fn extract_fields(
    runs: &[TextRun],
    index: usize,
    config: &ExtractionConfig,
    strategy: &dyn TitleSelectionStrategy,
) -> ExtractedFields {
    let choice = strategy.select(runs, config);

    let name = match &choice {
        Some(choice) => truncate_chars(choice.name.trim(), config.max_name_len),
        None => format!("Product {}", index),
    };

    let consumed: &[usize] = choice.as_ref().map(|c| c.consumed.as_slice()).unwrap_or(&[]);
    let rest: Vec<&str> = runs
        .iter()
        .enumerate()
        .filter(|(i, _)| !consumed.contains(i))
        .map(|(_, r)| r.text.trim())
        .filter(|t| !t.is_empty())
        .collect();

    let all_text = runs
        .iter()
        .map(|r| r.text.trim())
        .collect::<Vec<_>>()
        .join(" ");
    let categories = infer_categories(&all_text, index);

    let specs = rest
        .iter()
        .take(config.max_spec_runs)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    let specs = if specs.is_empty() {
        SPECS_PLACEHOLDER.to_string()
    } else {
        truncate_chars(&specs, config.max_specs_len)
    };

    let mut specs_list: Vec<String> = rest
        .iter()
        .take(config.max_specs_list)
        .map(|s| s.to_string())
        .collect();
    if specs_list.is_empty() {
        specs_list = default_specs_list(&categories.cct);
    }

    ExtractedFields {
        name,
        specs,
        specs_list,
        categories,
    }
}

pub fn default_specs_list(cct: &str) -> Vec<String> {
    vec![
        "CRI > 90".to_string(),
        format!("Voltage: {}", DEFAULT_VOLTAGE),
        format!("CCT: {}", cct),
    ]
}

fn single(runs: &[TextRun], i: usize) -> TitleChoice {
    TitleChoice {
        name: runs[i].text.trim().to_string(),
        consumed: vec![i],
    }
}

fn char_len(text: &str) -> usize {
    text.trim().chars().count()
}

/// Truncate to at most `max` characters (not bytes)
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
