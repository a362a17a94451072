use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::IngestArgs;
use crate::ingest::{ParseOptions, ParseOutcome, parse_test_cases};
use crate::model::{
    ImportRecord, IngestCounts, IngestPaths, IngestRunManifest, SourceEntry, TestCase,
};
use crate::store::{DB_SCHEMA_VERSION, ReviewStore, default_db_path};
use crate::util::{compact_timestamp, now_utc_string, sha256_bytes, write_json_pretty};

#[derive(Serialize)]
struct CasesResponse<'a> {
    #[serde(rename = "testCases")]
    test_cases: &'a [TestCase],
}

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", compact_timestamp(started_ts));

    let cache_root = args.cache_root.clone();
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        cache_root.join("manifests").join(format!(
            "ingest_run_{}.json",
            compact_timestamp(started_ts)
        ))
    });
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&cache_root));

    info!(csv = %args.csv.display(), run_id = %run_id, "starting ingest");

    let raw =
        fs::read(&args.csv).with_context(|| format!("failed to read {}", args.csv.display()))?;
    let source = SourceEntry {
        path: args.csv.display().to_string(),
        sha256: sha256_bytes(&raw),
        byte_len: raw.len(),
    };
    let text = String::from_utf8(raw)
        .with_context(|| format!("{} is not valid UTF-8", args.csv.display()))?;

    let options = ParseOptions {
        default_url: args.default_url.clone(),
    };
    let outcome = parse_test_cases(&text, &options)
        .with_context(|| format!("failed to parse {}", args.csv.display()))?;

    let warnings = outcome.stats.warnings();
    for warning in &warnings {
        warn!(warning = %warning, "ingest anomaly");
    }

    info!(
        logical_rows = outcome.stats.logical_rows,
        cases = outcome.stats.admitted,
        skipped = outcome.stats.skipped_missing_id + outcome.stats.skipped_missing_title,
        "parsed test cases"
    );

    if args.json {
        write_cases_json(&outcome.cases)?;
    }

    if args.dry_run {
        info!(cases = outcome.cases.len(), "ingest dry-run complete");
        return Ok(());
    }

    let mut store = ReviewStore::open(&db_path)?;
    let import = ImportRecord {
        run_id: run_id.clone(),
        source_path: source.path.clone(),
        sha256: source.sha256.clone(),
        imported_at: started_at.clone(),
        case_count: outcome.cases.len(),
        truncated_rows: usize::from(outcome.stats.unterminated.is_some()),
    };
    let stored = store.replace_cases(&import, &outcome.cases)?;
    info!(path = %db_path.display(), cases = stored, "stored review queue");

    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id,
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_ingest_command(&args),
        counts: ingest_counts(&outcome),
        headers: outcome.headers,
        source,
        paths: IngestPaths {
            cache_root: cache_root.display().to_string(),
            manifest_path: manifest_path.display().to_string(),
            db_path: db_path.display().to_string(),
        },
        warnings,
    };

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote ingest run manifest");

    Ok(())
}

fn ingest_counts(outcome: &ParseOutcome) -> IngestCounts {
    let stats = &outcome.stats;
    IngestCounts {
        physical_lines: stats.physical_lines,
        logical_rows: stats.logical_rows,
        cases_admitted: stats.admitted,
        rows_skipped_missing_id: stats.skipped_missing_id,
        rows_skipped_missing_title: stats.skipped_missing_title,
        placeholder_step_cases: stats.placeholder_steps,
        truncated_rows: usize::from(stats.unterminated.is_some()),
    }
}

fn write_cases_json(cases: &[TestCase]) -> Result<()> {
    let response = CasesResponse { test_cases: cases };

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &response)
        .context("failed to serialize test case json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn render_ingest_command(args: &IngestArgs) -> String {
    let mut command = format!(
        "qa-review ingest --cache-root {} --csv {}",
        args.cache_root.display(),
        args.csv.display()
    );
    if let Some(db_path) = &args.db_path {
        command.push_str(&format!(" --db-path {}", db_path.display()));
    }
    if let Some(manifest_path) = &args.manifest_path {
        command.push_str(&format!(" --manifest-path {}", manifest_path.display()));
    }
    if !args.default_url.is_empty() {
        command.push_str(&format!(" --default-url {}", args.default_url));
    }
    command
}
