//! CSV ingestion for exported test cases.
//!
//! Raw text is merged into logical rows by quote parity, each row is decoded
//! against the header into a [`FieldMap`], and each map is assembled into a
//! [`TestCase`] or skipped as a non-data row. Everything here is a pure
//! function of the input text.

mod assemble;
mod fields;
mod rows;
#[cfg(test)]
mod tests;

use thiserror::Error;
use tracing::warn;

use crate::model::TestCase;

use assemble::{Assembly, CaseAssembler, NO_STEPS_PLACEHOLDER, SkipReason};
use fields::{FieldMap, decode_headers};
use rows::{LogicalRows, UnterminatedRow};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(
        "malformed input: expected a header line and at least one data row, found {line_count} non-blank line(s)"
    )]
    MalformedInput { line_count: usize },

    #[error("failed to compile step normalization pattern")]
    InvalidPattern(#[from] regex::Error),
}

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub default_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub physical_lines: usize,
    pub logical_rows: usize,
    pub admitted: usize,
    pub skipped_missing_id: usize,
    pub skipped_missing_title: usize,
    pub placeholder_steps: usize,
    pub unterminated: Option<UnterminatedRow>,
}

impl ParseStats {
    /// Anomalies worth surfacing to the reviewer. Skipped section rows are
    /// expected and not reported.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(tail) = &self.unterminated {
            warnings.push(format!(
                "dropped unterminated quoted row starting at line {} ({} physical line(s))",
                tail.line, tail.physical_lines
            ));
        }
        if self.placeholder_steps > 0 {
            warnings.push(format!(
                "{} case(s) had no steps; substituted \"{}\"",
                self.placeholder_steps, NO_STEPS_PLACEHOLDER
            ));
        }

        warnings
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub headers: Vec<String>,
    pub cases: Vec<TestCase>,
    pub stats: ParseStats,
}

pub fn parse_test_cases(
    document: &str,
    options: &ParseOptions,
) -> Result<ParseOutcome, IngestError> {
    let document = document.strip_prefix('\u{feff}').unwrap_or(document);

    let has_data_rows = document
        .split('\n')
        .skip(1)
        .any(|line| !line.trim().is_empty());
    if !has_data_rows {
        let line_count = document
            .split('\n')
            .filter(|line| !line.trim().is_empty())
            .count();
        return Err(IngestError::MalformedInput { line_count });
    }

    let header_line = document.split('\n').next().unwrap_or_default();
    let headers = decode_headers(header_line.strip_suffix('\r').unwrap_or(header_line));
    let assembler = CaseAssembler::new(options.default_url.clone())?;

    let mut rows = LogicalRows::new(document);
    let mut stats = ParseStats::default();
    let mut cases = Vec::new();

    for row in rows.by_ref() {
        stats.logical_rows += 1;
        let fields = FieldMap::from_row(&headers, &row.text);

        match assembler.assemble(&fields, row.line) {
            Assembly::Admitted {
                case,
                placeholder_steps,
            } => {
                stats.admitted += 1;
                if placeholder_steps {
                    stats.placeholder_steps += 1;
                }
                cases.push(case);
            }
            Assembly::Skipped(SkipReason::MissingId) => stats.skipped_missing_id += 1,
            Assembly::Skipped(SkipReason::MissingTitle) => stats.skipped_missing_title += 1,
        }
    }

    stats.physical_lines = rows.physical_lines();
    if let Some(tail) = rows.unterminated() {
        warn!(
            line = tail.line,
            physical_lines = tail.physical_lines,
            "dropped unterminated quoted row at end of input"
        );
        stats.unterminated = Some(tail.clone());
    }

    Ok(ParseOutcome {
        headers,
        cases,
        stats,
    })
}
