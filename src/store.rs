use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::model::{CaseStatus, ImportRecord, Screenshot, StepVerdict, TestCase};
use crate::review::{Decision, ReviewSession};
use crate::util::ensure_parent_directory;

pub const DB_SCHEMA_VERSION: &str = "0.1.0";

const CURRENT_POSITION_KEY: &str = "current_position";

pub fn default_db_path(cache_root: &Path) -> PathBuf {
    cache_root.join("review.sqlite")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.approved + self.rejected
    }
}

/// A case as exported: the imported fields plus the recorded decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewedCase {
    pub case: TestCase,
    pub decision_notes: String,
    pub reviewed_at: String,
}

/// SQLite-backed review queue for a single local reviewer.
pub struct ReviewStore {
    connection: Connection,
}

struct CaseRow {
    case_id: String,
    title: String,
    steps_json: String,
    url: String,
    description: String,
    preconditions: String,
    postconditions: String,
    status: String,
}

impl CaseRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            case_id: row.get(0)?,
            title: row.get(1)?,
            steps_json: row.get(2)?,
            url: row.get(3)?,
            description: row.get(4)?,
            preconditions: row.get(5)?,
            postconditions: row.get(6)?,
            status: row.get(7)?,
        })
    }

    fn into_case(self) -> Result<TestCase> {
        let steps: Vec<String> = serde_json::from_str(&self.steps_json)
            .with_context(|| format!("failed to parse stored steps for case {}", self.case_id))?;
        let status = CaseStatus::parse(&self.status).with_context(|| {
            format!(
                "unknown stored status {:?} for case {}",
                self.status, self.case_id
            )
        })?;

        Ok(TestCase {
            id: self.case_id,
            title: self.title,
            steps,
            url: self.url,
            status,
            description: self.description,
            preconditions: self.preconditions,
            postconditions: self.postconditions,
        })
    }
}

const CASE_COLUMNS: &str =
    "case_id, title, steps_json, url, description, preconditions, postconditions, status";

impl ReviewStore {
    pub fn open(path: &Path) -> Result<Self> {
        ensure_parent_directory(path)?;

        let connection =
            Connection::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;

        Ok(Self { connection })
    }

    /// Replaces the whole queue with freshly imported cases and resets the cursor.
    pub fn replace_cases(&mut self, import: &ImportRecord, cases: &[TestCase]) -> Result<usize> {
        let tx = self.connection.transaction()?;

        tx.execute_batch(
            "
            DELETE FROM screenshots;
            DELETE FROM step_results;
            DELETE FROM cases;
            ",
        )
        .context("failed to clear previous review queue")?;

        {
            let mut statement = tx.prepare(
                "
                INSERT INTO cases(
                  position, case_id, title, steps_json, url,
                  description, preconditions, postconditions, status
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
            )?;

            for (position, case) in cases.iter().enumerate() {
                let steps_json = serde_json::to_string(&case.steps)
                    .with_context(|| format!("failed to serialize steps for case {}", case.id))?;
                statement
                    .execute(params![
                        position as i64,
                        &case.id,
                        &case.title,
                        steps_json,
                        &case.url,
                        &case.description,
                        &case.preconditions,
                        &case.postconditions,
                        case.status.as_str()
                    ])
                    .with_context(|| format!("failed to insert case {}", case.id))?;
            }
        }

        tx.execute(
            "
            INSERT INTO imports(run_id, source_path, sha256, imported_at, case_count, truncated_rows)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(run_id) DO UPDATE SET
              source_path=excluded.source_path,
              sha256=excluded.sha256,
              imported_at=excluded.imported_at,
              case_count=excluded.case_count,
              truncated_rows=excluded.truncated_rows
            ",
            params![
                &import.run_id,
                &import.source_path,
                &import.sha256,
                &import.imported_at,
                import.case_count as i64,
                import.truncated_rows as i64
            ],
        )
        .context("failed to record import")?;

        set_metadata(&tx, CURRENT_POSITION_KEY, "0")?;
        tx.commit()?;

        Ok(cases.len())
    }

    pub fn latest_import(&self) -> Result<Option<ImportRecord>> {
        self.connection
            .query_row(
                "
                SELECT run_id, source_path, sha256, imported_at, case_count, truncated_rows
                FROM imports
                ORDER BY imported_at DESC, run_id DESC
                LIMIT 1
                ",
                [],
                |row| {
                    Ok(ImportRecord {
                        run_id: row.get(0)?,
                        source_path: row.get(1)?,
                        sha256: row.get(2)?,
                        imported_at: row.get(3)?,
                        case_count: row.get::<_, i64>(4)? as usize,
                        truncated_rows: row.get::<_, i64>(5)? as usize,
                    })
                },
            )
            .optional()
            .context("failed to load latest import")
    }

    pub fn case_count(&self) -> Result<usize> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM cases", [], |row| row.get(0))
            .context("failed to count cases")?;
        Ok(count as usize)
    }

    pub fn load_case(&self, position: usize) -> Result<TestCase> {
        let sql = format!("SELECT {CASE_COLUMNS} FROM cases WHERE position = ?1");
        let row = self
            .connection
            .query_row(&sql, params![position as i64], CaseRow::from_row)
            .optional()
            .with_context(|| format!("failed to load case at position {}", position + 1))?;

        match row {
            Some(row) => row.into_case(),
            None => bail!("no case at position {}", position + 1),
        }
    }

    /// Cases in queue order with the outcome of their review, if decided.
    pub fn load_reviewed_cases(&self, status: Option<CaseStatus>) -> Result<Vec<ReviewedCase>> {
        let sql = format!(
            "
            SELECT {CASE_COLUMNS}, decision_notes, reviewed_at
            FROM cases
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY position
            "
        );
        let mut statement = self.connection.prepare(&sql)?;
        let rows = statement
            .query_map(params![status.map(CaseStatus::as_str)], |row| {
                let case = CaseRow::from_row(row)?;
                let decision_notes: Option<String> = row.get(8)?;
                let reviewed_at: Option<String> = row.get(9)?;
                Ok((case, decision_notes, reviewed_at))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to load reviewed cases")?;

        rows.into_iter()
            .map(|(case, decision_notes, reviewed_at)| {
                Ok(ReviewedCase {
                    case: case.into_case()?,
                    decision_notes: decision_notes.unwrap_or_default(),
                    reviewed_at: reviewed_at.unwrap_or_default(),
                })
            })
            .collect()
    }

    pub fn status_counts(&self) -> Result<StatusCounts> {
        let mut statement = self
            .connection
            .prepare("SELECT status, COUNT(*) FROM cases GROUP BY status")?;
        let mut rows = statement.query([])?;

        let mut counts = StatusCounts::default();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count = row.get::<_, i64>(1)? as usize;
            match CaseStatus::parse(&status) {
                Some(CaseStatus::Pending) => counts.pending += count,
                Some(CaseStatus::Approved) => counts.approved += count,
                Some(CaseStatus::Rejected) => counts.rejected += count,
                None => bail!("unknown stored status {status:?}"),
            }
        }

        Ok(counts)
    }

    pub fn current_position(&self) -> Result<usize> {
        let value = get_metadata(&self.connection, CURRENT_POSITION_KEY)?;
        let position = match value {
            Some(value) => value
                .parse::<usize>()
                .with_context(|| format!("invalid stored cursor {value:?}"))?,
            None => 0,
        };
        Ok(position)
    }

    pub fn set_current_position(&self, position: usize) -> Result<()> {
        let count = self.case_count()?;
        if position >= count {
            bail!(
                "case {} is out of range; queue has {} case(s)",
                position + 1,
                count
            );
        }
        set_metadata(&self.connection, CURRENT_POSITION_KEY, &position.to_string())
    }

    /// Loads a case together with its stored review state.
    pub fn load_session(&self, position: usize) -> Result<(TestCase, ReviewSession)> {
        let case = self.load_case(position)?;
        let (step_cursor, notes): (i64, String) = self
            .connection
            .query_row(
                "SELECT step_cursor, notes FROM cases WHERE position = ?1",
                params![position as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .with_context(|| format!("failed to load review state for case {}", case.id))?;

        let mut step_results = BTreeMap::new();
        {
            let mut statement = self.connection.prepare(
                "SELECT step_index, verdict FROM step_results WHERE position = ?1 ORDER BY step_index",
            )?;
            let mut rows = statement.query(params![position as i64])?;
            while let Some(row) = rows.next()? {
                let step_index = row.get::<_, i64>(0)? as usize;
                let verdict: String = row.get(1)?;
                let verdict = StepVerdict::parse(&verdict)
                    .with_context(|| format!("unknown stored verdict {verdict:?}"))?;
                step_results.insert(step_index, verdict);
            }
        }

        let screenshots = {
            let mut statement = self.connection.prepare(
                "
                SELECT step_index, step, path, sha256, captured_at
                FROM screenshots
                WHERE position = ?1
                ORDER BY step_index
                ",
            )?;
            statement
                .query_map(params![position as i64], |row| {
                    Ok(Screenshot {
                        step_index: row.get::<_, i64>(0)? as usize,
                        step: row.get(1)?,
                        path: row.get(2)?,
                        sha256: row.get(3)?,
                        captured_at: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("failed to load screenshots")?
        };

        let session = ReviewSession::restore(
            case.steps.len(),
            step_cursor.max(0) as usize,
            step_results,
            screenshots,
            notes,
        );
        Ok((case, session))
    }

    /// Overwrites the stored review state of one case with `session`.
    pub fn save_session(&mut self, position: usize, session: &ReviewSession) -> Result<()> {
        let tx = self.connection.transaction()?;
        let position_param = position as i64;

        let updated = tx.execute(
            "UPDATE cases SET step_cursor = ?2, notes = ?3 WHERE position = ?1",
            params![position_param, session.step_index() as i64, session.notes()],
        )?;
        if updated == 0 {
            bail!("no case at position {}", position + 1);
        }

        tx.execute(
            "DELETE FROM step_results WHERE position = ?1",
            params![position_param],
        )?;
        tx.execute(
            "DELETE FROM screenshots WHERE position = ?1",
            params![position_param],
        )?;

        {
            let mut result_statement = tx.prepare(
                "INSERT INTO step_results(position, step_index, verdict) VALUES(?1, ?2, ?3)",
            )?;
            for (step_index, verdict) in session.step_results() {
                result_statement.execute(params![
                    position_param,
                    *step_index as i64,
                    verdict.as_str()
                ])?;
            }

            let mut screenshot_statement = tx.prepare(
                "
                INSERT INTO screenshots(position, step_index, step, path, sha256, captured_at)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )?;
            for shot in session.screenshots() {
                screenshot_statement.execute(params![
                    position_param,
                    shot.step_index as i64,
                    &shot.step,
                    &shot.path,
                    &shot.sha256,
                    &shot.captured_at
                ])?;
            }
        }

        tx.commit()
            .with_context(|| format!("failed to save review state for case {}", position + 1))?;
        Ok(())
    }

    pub fn record_decision(
        &self,
        position: usize,
        decision: &Decision,
        reviewed_at: &str,
    ) -> Result<()> {
        let updated = self
            .connection
            .execute(
                "
                UPDATE cases
                SET status = ?2, decision_notes = ?3, reviewed_at = ?4
                WHERE position = ?1
                ",
                params![
                    position as i64,
                    decision.status.as_str(),
                    &decision.notes,
                    reviewed_at
                ],
            )
            .context("failed to record decision")?;
        if updated == 0 {
            bail!("no case at position {}", position + 1);
        }
        Ok(())
    }

    pub fn decision_notes(&self, position: usize) -> Result<Option<String>> {
        self.connection
            .query_row(
                "SELECT decision_notes FROM cases WHERE position = ?1",
                params![position as i64],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to load decision notes for case {}", position + 1))
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS imports (
              run_id TEXT PRIMARY KEY,
              source_path TEXT NOT NULL,
              sha256 TEXT NOT NULL,
              imported_at TEXT NOT NULL,
              case_count INTEGER NOT NULL,
              truncated_rows INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS cases (
              position INTEGER PRIMARY KEY,
              case_id TEXT NOT NULL,
              title TEXT NOT NULL,
              steps_json TEXT NOT NULL,
              url TEXT NOT NULL DEFAULT '',
              description TEXT NOT NULL DEFAULT '',
              preconditions TEXT NOT NULL DEFAULT '',
              postconditions TEXT NOT NULL DEFAULT '',
              status TEXT NOT NULL DEFAULT 'pending',
              step_cursor INTEGER NOT NULL DEFAULT 0,
              notes TEXT NOT NULL DEFAULT '',
              decision_notes TEXT,
              reviewed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS step_results (
              position INTEGER NOT NULL,
              step_index INTEGER NOT NULL,
              verdict TEXT NOT NULL,
              PRIMARY KEY(position, step_index),
              FOREIGN KEY(position) REFERENCES cases(position)
            );

            CREATE TABLE IF NOT EXISTS screenshots (
              position INTEGER NOT NULL,
              step_index INTEGER NOT NULL,
              step TEXT NOT NULL,
              path TEXT NOT NULL,
              sha256 TEXT NOT NULL,
              captured_at TEXT NOT NULL,
              PRIMARY KEY(position, step_index),
              FOREIGN KEY(position) REFERENCES cases(position)
            );
            ",
        )
        .context("failed to create review schema")?;

    set_metadata(connection, "db_schema_version", DB_SCHEMA_VERSION)
}

fn get_metadata(connection: &Connection, key: &str) -> Result<Option<String>> {
    connection
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed to read metadata key {key}"))
}

fn set_metadata(connection: &Connection, key: &str, value: &str) -> Result<()> {
    connection
        .execute(
            "
            INSERT INTO metadata(key, value) VALUES(?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value
            ",
            params![key, value],
        )
        .with_context(|| format!("failed to write metadata key {key}"))?;
    Ok(())
}
