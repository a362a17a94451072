use regex::Regex;
use tracing::debug;

use super::fields::FieldMap;
use crate::model::{CaseStatus, TestCase};

/// Step text given to an admitted case whose actions column is empty.
pub const NO_STEPS_PLACEHOLDER: &str = "No steps provided";

const ID_COLUMNS: &[&str] = &["v2.id", "id"];
const TITLE_COLUMN: &str = "title";
const ACTION_COLUMNS: &[&str] = &["steps_actions", "steps"];
const RESULT_COLUMN: &str = "steps_result";
const URL_COLUMN: &str = "url";
const DESCRIPTION_COLUMN: &str = "description";
const PRECONDITIONS_COLUMN: &str = "preconditions";
const POSTCONDITIONS_COLUMN: &str = "postconditions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingId,
    MissingTitle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    Admitted {
        case: TestCase,
        placeholder_steps: bool,
    },
    Skipped(SkipReason),
}

pub struct CaseAssembler {
    ordinal_prefix: Regex,
    default_url: String,
}

impl CaseAssembler {
    pub fn new(default_url: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            ordinal_prefix: Regex::new(r#"^\d+\.\s*"?"#)?,
            default_url: default_url.into(),
        })
    }

    /// Builds a case from one row, or reports why the row is not case data.
    ///
    /// Suite and section rows share the case columns but leave the identifier
    /// or title blank; they are skipped, not rejected. `line` is only used for
    /// diagnostics.
    pub fn assemble(&self, fields: &FieldMap, line: usize) -> Assembly {
        let id = fields
            .first_present(ID_COLUMNS)
            .map(str::trim)
            .unwrap_or_default();
        if id.is_empty() {
            debug!(line, "skipping row without identifier");
            return Assembly::Skipped(SkipReason::MissingId);
        }

        let title = fields.value(TITLE_COLUMN).trim();
        if title.is_empty() {
            debug!(line, id, "skipping row without title");
            return Assembly::Skipped(SkipReason::MissingTitle);
        }

        let actions = self.split_steps(fields.first_present(ACTION_COLUMNS).unwrap_or_default());
        let results = self.split_steps(fields.value(RESULT_COLUMN));

        let mut steps = pair_steps(&actions, &results);
        let placeholder_steps = steps.is_empty();
        if placeholder_steps {
            steps.push(NO_STEPS_PLACEHOLDER.to_string());
        }

        let url = match fields.value(URL_COLUMN).trim() {
            "" => self.default_url.clone(),
            url => url.to_string(),
        };

        Assembly::Admitted {
            case: TestCase {
                id: id.to_string(),
                title: title.to_string(),
                steps,
                url,
                status: CaseStatus::Pending,
                description: fields.value(DESCRIPTION_COLUMN).to_string(),
                preconditions: fields.value(PRECONDITIONS_COLUMN).to_string(),
                postconditions: fields.value(POSTCONDITIONS_COLUMN).to_string(),
            },
            placeholder_steps,
        }
    }

    /// One entry per non-blank line, with export numbering and stray quotes removed.
    pub fn split_steps(&self, field: &str) -> Vec<String> {
        field
            .split('\n')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| self.strip_markers(entry))
            .collect()
    }

    fn strip_markers(&self, entry: &str) -> String {
        let without_ordinal = self.ordinal_prefix.replace(entry, "");
        let without_quote = without_ordinal
            .strip_suffix('"')
            .unwrap_or(without_ordinal.as_ref());
        without_quote.trim().to_string()
    }
}

/// Pairs actions with expected results by position. Results beyond the last
/// action are dropped.
pub fn pair_steps(actions: &[String], results: &[String]) -> Vec<String> {
    actions
        .iter()
        .enumerate()
        .map(|(index, action)| match results.get(index) {
            Some(result) if !result.is_empty() => format!("{action} -> Expected: {result}"),
            _ => action.clone(),
        })
        .collect()
}
