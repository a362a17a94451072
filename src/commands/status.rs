use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::{ReviewStore, default_db_path};

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.cache_root));

    info!(cache_root = %args.cache_root.display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "review database missing; run ingest first");
        return Ok(());
    }

    let store = ReviewStore::open(&db_path)?;

    match store.latest_import()? {
        Some(import) => info!(
            run_id = %import.run_id,
            source = %import.source_path,
            sha256 = %import.sha256,
            imported_at = %import.imported_at,
            cases = import.case_count,
            truncated_rows = import.truncated_rows,
            "latest import"
        ),
        None => warn!(path = %db_path.display(), "no import recorded"),
    }

    let counts = store.status_counts()?;
    info!(
        total = counts.total(),
        pending = counts.pending,
        approved = counts.approved,
        rejected = counts.rejected,
        "review progress"
    );

    if counts.total() > 0 {
        let position = store.current_position()?;
        let case = store.load_case(position)?;
        info!(
            case = position + 1,
            id = %case.id,
            title = %case.title,
            status = case.status.as_str(),
            "current case"
        );
    }

    Ok(())
}
