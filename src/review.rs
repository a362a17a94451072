//! Per-case review state. Every operation returns a new [`ReviewSession`]
//! and leaves the receiver untouched, so callers persist whole values.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::model::{CaseStatus, Screenshot, StepVerdict};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReviewError {
    #[error("step {requested} is out of range; case has {step_count} step(s)")]
    StepOutOfRange { requested: usize, step_count: usize },

    #[error("a case can only be decided as approved or rejected, not {0}")]
    NotADecision(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewSession {
    step_index: usize,
    step_count: usize,
    step_results: BTreeMap<usize, StepVerdict>,
    screenshots: Vec<Screenshot>,
    notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub status: CaseStatus,
    pub notes: String,
}

impl ReviewSession {
    pub fn new(step_count: usize) -> Self {
        Self {
            step_index: 0,
            step_count,
            step_results: BTreeMap::new(),
            screenshots: Vec::new(),
            notes: String::new(),
        }
    }

    /// Rebuilds a stored session. Out-of-range cursors, verdicts and
    /// screenshots are dropped.
    pub fn restore(
        step_count: usize,
        step_index: usize,
        step_results: BTreeMap<usize, StepVerdict>,
        screenshots: Vec<Screenshot>,
        notes: String,
    ) -> Self {
        let mut session = Self::new(step_count);
        session.step_index = step_index.min(session.last_index());
        session.step_results = step_results
            .into_iter()
            .filter(|(index, _)| *index < step_count)
            .collect();
        session.screenshots = screenshots
            .into_iter()
            .filter(|shot| shot.step_index < step_count)
            .collect();
        session.screenshots.sort_by_key(|shot| shot.step_index);
        session.notes = notes;
        session
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn step_results(&self) -> &BTreeMap<usize, StepVerdict> {
        &self.step_results
    }

    pub fn screenshots(&self) -> &[Screenshot] {
        &self.screenshots
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn is_last_step(&self) -> bool {
        self.step_index == self.last_index()
    }

    pub fn current_verdict(&self) -> Option<StepVerdict> {
        self.step_results.get(&self.step_index).copied()
    }

    pub fn current_screenshot(&self) -> Option<&Screenshot> {
        self.screenshots
            .iter()
            .find(|shot| shot.step_index == self.step_index)
    }

    pub fn next_step(&self) -> Self {
        let mut next = self.clone();
        next.step_index = (self.step_index + 1).min(self.last_index());
        next
    }

    pub fn prev_step(&self) -> Self {
        let mut next = self.clone();
        next.step_index = self.step_index.saturating_sub(1);
        next
    }

    pub fn goto_step(&self, step_index: usize) -> Result<Self, ReviewError> {
        self.check_step(step_index)?;
        let mut next = self.clone();
        next.step_index = step_index;
        Ok(next)
    }

    pub fn mark_step(&self, verdict: StepVerdict) -> Self {
        let mut next = self.clone();
        next.step_results.insert(self.step_index, verdict);
        next
    }

    /// Stores a screenshot, replacing any earlier one for the same step.
    pub fn attach_screenshot(&self, screenshot: Screenshot) -> Result<Self, ReviewError> {
        self.check_step(screenshot.step_index)?;
        let mut next = self.clone();
        next.screenshots
            .retain(|shot| shot.step_index != screenshot.step_index);
        next.screenshots.push(screenshot);
        next.screenshots.sort_by_key(|shot| shot.step_index);
        Ok(next)
    }

    pub fn with_notes(&self, notes: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.notes = notes.into();
        next
    }

    /// 1-based numbers of the steps marked as failed.
    pub fn failed_steps(&self) -> Vec<usize> {
        self.step_results
            .iter()
            .filter(|(_, verdict)| **verdict == StepVerdict::Fail)
            .map(|(index, _)| index + 1)
            .collect()
    }

    pub fn final_notes(&self) -> String {
        let failed = self.failed_steps();
        if failed.is_empty() {
            return self.notes.clone();
        }

        let listed = failed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}\n\nFailed steps: {listed}", self.notes)
    }

    pub fn decide(&self, status: CaseStatus) -> Result<Decision, ReviewError> {
        if status == CaseStatus::Pending {
            return Err(ReviewError::NotADecision(status.as_str()));
        }

        Ok(Decision {
            status,
            notes: self.final_notes(),
        })
    }

    fn last_index(&self) -> usize {
        self.step_count.saturating_sub(1)
    }

    fn check_step(&self, step_index: usize) -> Result<(), ReviewError> {
        if step_index >= self.step_count {
            return Err(ReviewError::StepOutOfRange {
                requested: step_index + 1,
                step_count: self.step_count,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shot(step_index: usize, path: &str) -> Screenshot {
        Screenshot {
            step_index,
            step: format!("step {}", step_index + 1),
            path: path.to_string(),
            sha256: "00".repeat(32),
            captured_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn navigation_saturates_at_both_ends() {
        let session = ReviewSession::new(3);
        assert_eq!(session.prev_step().step_index(), 0);
        assert!(!session.is_last_step());

        let last = session.next_step().next_step().next_step();
        assert_eq!(last.step_index(), 2);
        assert!(last.is_last_step());
    }

    #[test]
    fn operations_leave_previous_value_untouched() {
        let before = ReviewSession::new(2);
        let after = before.mark_step(StepVerdict::Fail).with_notes("flaky");

        assert!(before.step_results().is_empty());
        assert_eq!(before.notes(), "");
        assert_eq!(after.current_verdict(), Some(StepVerdict::Fail));
    }

    #[test]
    fn goto_step_rejects_out_of_range() {
        let session = ReviewSession::new(2);

        assert_eq!(session.goto_step(1).expect("in range").step_index(), 1);
        assert_eq!(
            session.goto_step(2),
            Err(ReviewError::StepOutOfRange {
                requested: 3,
                step_count: 2
            })
        );
    }

    #[test]
    fn screenshot_replaces_existing_one_for_same_step() {
        let session = ReviewSession::new(2)
            .attach_screenshot(shot(0, "first.png"))
            .expect("attach")
            .attach_screenshot(shot(0, "second.png"))
            .expect("attach");

        assert_eq!(session.screenshots().len(), 1);
        assert_eq!(
            session.current_screenshot().map(|s| s.path.as_str()),
            Some("second.png")
        );
        assert!(session.attach_screenshot(shot(5, "late.png")).is_err());
    }

    #[test]
    fn decision_appends_failed_steps_to_notes() {
        let session = ReviewSession::new(4)
            .mark_step(StepVerdict::Fail)
            .next_step()
            .mark_step(StepVerdict::Pass)
            .next_step()
            .mark_step(StepVerdict::Fail)
            .with_notes("Login button misaligned");

        assert_eq!(session.failed_steps(), vec![1, 3]);

        let decision = session.decide(CaseStatus::Rejected).expect("decision");
        assert_eq!(decision.status, CaseStatus::Rejected);
        assert_eq!(
            decision.notes,
            "Login button misaligned\n\nFailed steps: 1, 3"
        );
    }

    #[test]
    fn decision_without_failures_keeps_notes_verbatim() {
        let session = ReviewSession::new(1).mark_step(StepVerdict::Pass);

        let decision = session.decide(CaseStatus::Approved).expect("decision");
        assert_eq!(decision.notes, "");
        assert!(session.decide(CaseStatus::Pending).is_err());
    }

    #[test]
    fn restore_clamps_stale_state() {
        let mut results = BTreeMap::new();
        results.insert(0, StepVerdict::Pass);
        results.insert(9, StepVerdict::Fail);

        let session = ReviewSession::restore(
            2,
            7,
            results,
            vec![shot(1, "b.png"), shot(4, "gone.png")],
            "kept".to_string(),
        );

        assert_eq!(session.step_index(), 1);
        assert_eq!(session.step_results().len(), 1);
        assert_eq!(session.screenshots().len(), 1);
        assert_eq!(session.notes(), "kept");
    }
}
