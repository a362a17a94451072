use std::fs::File;
use std::io::Write;

use anyhow::{Context, Result, bail};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::info;

use crate::cli::{ExportArgs, ExportFilter};
use crate::model::CaseStatus;
use crate::store::{ReviewStore, ReviewedCase, default_db_path};
use crate::util::ensure_parent_directory;

const EXPORT_COLUMNS: [&str; 10] = [
    "id",
    "title",
    "steps",
    "url",
    "status",
    "notes",
    "reviewed_at",
    "description",
    "preconditions",
    "postconditions",
];

pub fn run(args: ExportArgs) -> Result<()> {
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

    let store = ReviewStore::open(&db_path)?;
    let cases = store.load_reviewed_cases(status_filter(args.status))?;

    let out_path = args.out.clone().unwrap_or_else(|| {
        args.cache_root
            .join("exports")
            .join(format!("{}-test-cases.csv", args.status.as_str()))
    });
    ensure_parent_directory(&out_path)?;

    let file = File::create(&out_path)
        .with_context(|| format!("failed to create {}", out_path.display()))?;
    write_cases_csv(file, &cases)
        .with_context(|| format!("failed to write {}", out_path.display()))?;

    info!(
        path = %out_path.display(),
        status = args.status.as_str(),
        cases = cases.len(),
        "wrote export"
    );
    Ok(())
}

fn status_filter(filter: ExportFilter) -> Option<CaseStatus> {
    match filter {
        ExportFilter::Approved => Some(CaseStatus::Approved),
        ExportFilter::Rejected => Some(CaseStatus::Rejected),
        ExportFilter::Pending => Some(CaseStatus::Pending),
        ExportFilter::All => None,
    }
}

/// Every field is quoted; steps stay one per line inside their cell.
///
/// The file can be ingested again, but not losslessly: steps that start with
/// `N.` or end with a double quote lose those markers on the way back in.
pub fn write_cases_csv<W: Write>(output: W, cases: &[ReviewedCase]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(output);

    writer
        .write_record(EXPORT_COLUMNS)
        .context("failed to write export header")?;

    for reviewed in cases {
        let case = &reviewed.case;
        let steps = case.steps.join("\n");
        writer
            .write_record([
                case.id.as_str(),
                case.title.as_str(),
                steps.as_str(),
                case.url.as_str(),
                case.status.as_str(),
                reviewed.decision_notes.as_str(),
                reviewed.reviewed_at.as_str(),
                case.description.as_str(),
                case.preconditions.as_str(),
                case.postconditions.as_str(),
            ])
            .with_context(|| format!("failed to write export row for case {}", case.id))?;
    }

    writer.flush().context("failed to flush export")?;
    Ok(())
}
