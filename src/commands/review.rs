use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

use crate::cli::{DecisionArg, ReviewAction, ReviewArgs, VerdictArg};
use crate::model::{CaseStatus, Screenshot, StepVerdict, TestCase};
use crate::review::ReviewSession;
use crate::store::{ReviewStore, default_db_path};
use crate::util::{now_utc_string, sha256_file};

#[derive(Serialize)]
struct ShowResponse<'a> {
    position: usize,
    case_count: usize,
    case: &'a TestCase,
    session: &'a ReviewSession,
    decision_notes: Option<String>,
}

pub fn run(args: ReviewArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.cache_root));
    if !db_path.exists() {
        bail!(
            "no review database at {}; run `qa-review ingest` first",
            db_path.display()
        );
    }

    let mut store = ReviewStore::open(&db_path)?;
    if store.case_count()? == 0 {
        bail!("review queue is empty");
    }
    let position = store.current_position()?;

    match args.action {
        ReviewAction::Show { json } => show(&store, position, json),
        ReviewAction::Next => update_session(&mut store, position, |_, session| {
            Ok(session.next_step())
        }),
        ReviewAction::Prev => update_session(&mut store, position, |_, session| {
            Ok(session.prev_step())
        }),
        ReviewAction::Goto { step } => {
            let step_index = step.checked_sub(1).context("steps are numbered from 1")?;
            update_session(&mut store, position, |_, session| {
                Ok(session.goto_step(step_index)?)
            })
        }
        ReviewAction::Mark { verdict } => update_session(&mut store, position, |_, session| {
            Ok(session.mark_step(step_verdict(verdict)))
        }),
        ReviewAction::Screenshot { path } => attach_screenshot(&mut store, position, &path),
        ReviewAction::Notes { text } => {
            update_session(&mut store, position, |_, session| Ok(session.with_notes(text)))
        }
        ReviewAction::Decide { decision } => decide(&store, position, case_status(decision)),
        ReviewAction::Select { case } => {
            let target = case.checked_sub(1).context("cases are numbered from 1")?;
            store.set_current_position(target)?;
            let selected = store.load_case(target)?;
            info!(case = case, id = %selected.id, title = %selected.title, "selected case");
            Ok(())
        }
    }
}

fn step_verdict(verdict: VerdictArg) -> StepVerdict {
    match verdict {
        VerdictArg::Pass => StepVerdict::Pass,
        VerdictArg::Fail => StepVerdict::Fail,
    }
}

fn case_status(decision: DecisionArg) -> CaseStatus {
    match decision {
        DecisionArg::Approve => CaseStatus::Approved,
        DecisionArg::Reject => CaseStatus::Rejected,
    }
}

fn update_session<F>(store: &mut ReviewStore, position: usize, apply: F) -> Result<()>
where
    F: FnOnce(&TestCase, &ReviewSession) -> Result<ReviewSession>,
{
    let (case, session) = store.load_session(position)?;
    let next = apply(&case, &session)?;
    store.save_session(position, &next)?;

    info!(
        case = position + 1,
        id = %case.id,
        step = next.step_index() + 1,
        steps = next.step_count(),
        last_step = next.is_last_step(),
        verdict = next.current_verdict().map(StepVerdict::as_str).unwrap_or("pending"),
        text = %case.steps.get(next.step_index()).map(String::as_str).unwrap_or_default(),
        "review state saved"
    );
    Ok(())
}

fn attach_screenshot(store: &mut ReviewStore, position: usize, path: &Path) -> Result<()> {
    let path = fs::canonicalize(path)
        .with_context(|| format!("screenshot not found: {}", path.display()))?;
    let sha256 = sha256_file(&path)?;

    update_session(store, position, |case, session| {
        let step_index = session.step_index();
        let screenshot = Screenshot {
            step_index,
            step: case.steps.get(step_index).cloned().unwrap_or_default(),
            path: path.display().to_string(),
            sha256,
            captured_at: now_utc_string(),
        };
        Ok(session.attach_screenshot(screenshot)?)
    })
}

fn decide(store: &ReviewStore, position: usize, status: CaseStatus) -> Result<()> {
    let (case, session) = store.load_session(position)?;
    let decision = session.decide(status)?;

    store.record_decision(position, &decision, &now_utc_string())?;
    info!(
        case = position + 1,
        id = %case.id,
        status = decision.status.as_str(),
        failed_steps = ?session.failed_steps(),
        "recorded decision"
    );

    let case_count = store.case_count()?;
    if position + 1 < case_count {
        store.set_current_position(position + 1)?;
        info!(case = position + 2, cases = case_count, "moved to next case");
    } else {
        info!(cases = case_count, "reached the end of the review queue");
    }

    Ok(())
}

fn show(store: &ReviewStore, position: usize, json: bool) -> Result<()> {
    let (case, session) = store.load_session(position)?;
    let case_count = store.case_count()?;
    let decision_notes = store.decision_notes(position)?;

    if json {
        let response = ShowResponse {
            position: position + 1,
            case_count,
            case: &case,
            session: &session,
            decision_notes,
        };

        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize review json output")?;
        writeln!(output)?;
        output.flush()?;
        return Ok(());
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    write_case_text(
        &mut output,
        position,
        case_count,
        &case,
        &session,
        decision_notes.as_deref(),
    )?;
    output.flush()?;
    Ok(())
}

fn write_case_text<W: Write>(
    output: &mut W,
    position: usize,
    case_count: usize,
    case: &TestCase,
    session: &ReviewSession,
    decision_notes: Option<&str>,
) -> Result<()> {
    writeln!(
        output,
        "Case {}/{} [{}] {}: {}",
        position + 1,
        case_count,
        case.status.as_str(),
        case.id,
        case.title
    )?;
    if !case.url.is_empty() {
        writeln!(output, "Url: {}", case.url)?;
    }
    for (label, value) in [
        ("Description", &case.description),
        ("Preconditions", &case.preconditions),
        ("Postconditions", &case.postconditions),
    ] {
        if !value.trim().is_empty() {
            writeln!(output, "{label}: {}", value.trim())?;
        }
    }

    writeln!(output, "Steps:")?;
    for (index, step) in case.steps.iter().enumerate() {
        let cursor = if index == session.step_index() { ">" } else { " " };
        let verdict = session
            .step_results()
            .get(&index)
            .map(|verdict| verdict.as_str())
            .unwrap_or("pending");
        writeln!(output, "{cursor} {}.\t[{verdict}]\t{step}", index + 1)?;
    }

    if let Some(shot) = session.current_screenshot() {
        writeln!(output, "Screenshot: {} (sha256 {})", shot.path, shot.sha256)?;
    }
    if !session.notes().is_empty() {
        writeln!(output, "Notes: {}", session.notes())?;
    }
    if let Some(notes) = decision_notes.filter(|notes| !notes.is_empty()) {
        writeln!(output, "Decision notes: {notes}")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_text_marks_cursor_and_verdicts() {
        let case = TestCase {
            id: "TC-7".to_string(),
            title: "Valid login".to_string(),
            steps: vec!["Open page".to_string(), "Click login".to_string()],
            url: "https://app.test".to_string(),
            status: CaseStatus::Pending,
            description: String::new(),
            preconditions: "User exists".to_string(),
            postconditions: String::new(),
        };
        let session = ReviewSession::new(2)
            .mark_step(StepVerdict::Pass)
            .next_step()
            .with_notes("slow");

        let mut buffer = Vec::new();
        write_case_text(&mut buffer, 0, 3, &case, &session, None).expect("render");
        let text = String::from_utf8(buffer).expect("utf8");

        assert!(text.starts_with("Case 1/3 [pending] TC-7: Valid login\n"));
        assert!(text.contains("Preconditions: User exists\n"));
        assert!(text.contains("  1.\t[pass]\tOpen page\n"));
        assert!(text.contains("> 2.\t[pending]\tClick login\n"));
        assert!(text.contains("Notes: slow\n"));
        assert!(!text.contains("Description"));
    }

    #[test]
    fn decision_arguments_map_to_final_statuses() {
        assert_eq!(case_status(DecisionArg::Approve), CaseStatus::Approved);
        assert_eq!(case_status(DecisionArg::Reject), CaseStatus::Rejected);
        assert_eq!(step_verdict(VerdictArg::Fail), StepVerdict::Fail);
    }
}
