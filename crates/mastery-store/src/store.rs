use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use tracing::debug;

use mastery_core::{
    parse_timestamp, Annotation, AnnotationSink, Level, MasteryError, MasteryResult,
    ProgressStore, QuizAttemptResult,
};

use crate::schema::init_db;

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(path: &Path) -> MasteryResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MasteryError::Storage(format!("cannot create db directory: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| MasteryError::Storage(format!("cannot open database: {e}")))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| MasteryError::Storage(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| MasteryError::Storage(e.to_string()))?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> MasteryResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MasteryError::Storage(format!("cannot open in-memory db: {e}")))?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    /// Annotations for `subject` in the order they were written.
    pub fn annotations(&self, subject: &str, limit: usize) -> MasteryResult<Vec<Annotation>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, subject, text, created_at FROM annotations
                 WHERE subject = ?1 ORDER BY rowid ASC LIMIT ?2",
            )
            .map_err(|e| MasteryError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![subject, limit as i64], row_to_annotation)
            .map_err(|e| MasteryError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| MasteryError::Storage(e.to_string()))?);
        }
        Ok(results)
    }

    pub fn count(&self) -> MasteryResult<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM attempts", [], |row| {
                row.get::<_, usize>(0)
            })
            .map_err(|e| MasteryError::Storage(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    parse_timestamp(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp: {s}").into(),
        )
    })
}

fn row_to_attempt(row: &rusqlite::Row) -> rusqlite::Result<QuizAttemptResult> {
    let timestamp_str: String = row.get(1)?;
    let level_str: String = row.get(4)?;
    let level: Level = level_str
        .parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?;

    Ok(QuizAttemptResult {
        student: row.get(0)?,
        timestamp: parse_ts(1, &timestamp_str)?,
        topic: row.get(2)?,
        accuracy: row.get(3)?,
        level,
        correct_count: row.get(5)?,
        total_count: row.get(6)?,
    })
}

fn row_to_annotation(row: &rusqlite::Row) -> rusqlite::Result<Annotation> {
    let created_at_str: String = row.get(3)?;
    Ok(Annotation {
        id: row.get(0)?,
        subject: row.get(1)?,
        text: row.get(2)?,
        created_at: parse_ts(3, &created_at_str)?,
    })
}

const SELECT_COLS: &str =
    "student, timestamp, topic, accuracy, level, correct_count, total_count";

// ---------------------------------------------------------------------------
// ProgressStore impl
// ---------------------------------------------------------------------------

impl ProgressStore for SqliteStore {
    fn append(&self, result: &QuizAttemptResult) -> MasteryResult<()> {
        // A single INSERT is atomic; SQLite's write lock serializes writers.
        self.conn
            .execute(
                "INSERT INTO attempts (student, timestamp, topic, accuracy, level,
                 correct_count, total_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    result.student,
                    format_ts(&result.timestamp),
                    result.topic,
                    result.accuracy,
                    result.level.as_str(),
                    result.correct_count,
                    result.total_count,
                ],
            )
            .map_err(|e| MasteryError::Storage(e.to_string()))?;

        debug!(student = %result.student, topic = %result.topic, "appended attempt");
        Ok(())
    }

    fn history(&self, student: &str, topic: Option<&str>) -> MasteryResult<Vec<QuizAttemptResult>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {SELECT_COLS} FROM attempts
                 WHERE student = ?1 AND (?2 IS NULL OR topic = ?2)
                 ORDER BY seq ASC"
            ))
            .map_err(|e| MasteryError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![student, topic], row_to_attempt)
            .map_err(|e| MasteryError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| MasteryError::Storage(e.to_string()))?);
        }
        Ok(results)
    }

    fn latest(&self, student: &str, topic: &str) -> MasteryResult<Option<QuizAttemptResult>> {
        use rusqlite::OptionalExtension;

        self.conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLS} FROM attempts
                     WHERE student = ?1 AND topic = ?2
                     ORDER BY seq DESC LIMIT 1"
                ),
                params![student, topic],
                row_to_attempt,
            )
            .optional()
            .map_err(|e| MasteryError::Storage(e.to_string()))
    }

    fn students(&self) -> MasteryResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT student FROM attempts ORDER BY student")
            .map_err(|e| MasteryError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| MasteryError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| MasteryError::Storage(e.to_string()))?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// AnnotationSink impl
// ---------------------------------------------------------------------------

impl AnnotationSink for SqliteStore {
    fn annotate(&self, subject: &str, text: &str) -> MasteryResult<()> {
        self.conn
            .execute(
                "INSERT INTO annotations (id, subject, text, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    ulid::Ulid::new().to_string(),
                    subject,
                    text,
                    format_ts(&Utc::now()),
                ],
            )
            .map_err(|e| MasteryError::Storage(e.to_string()))?;
        Ok(())
    }
}
