//! SQLite-backed audit trail: AI invocations and job-run history.
//!
//! One small database, two tables. AI requests are written when the call
//! starts and completed in place; job runs are appended after each scheduled
//! or manual execution when the audit trail is enabled.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use clawdbot_core::domain::AiRequest;
use clawdbot_core::error::{BotError, Result};

/// Outcome of one run of a named command.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JobRunRecord {
    pub command: String,
    /// "scheduler" or the admin's user id.
    pub triggered_by: String,
    pub forced: bool,
    pub preview: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// "ok", "partial", "failed", or "skipped".
    pub outcome: String,
    pub processed: u64,
    pub affected: u64,
    pub failures: u64,
    pub detail: serde_json::Value,
}

pub struct AuditDb {
    conn: Mutex<Connection>,
}

impl AuditDb {
    /// Open or create the audit database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| BotError::Storage(format!("audit db open: {e}")))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database for tests and `--ephemeral` runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BotError::Storage(format!("audit db open: {e}")))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BotError::Storage("audit db lock poisoned".into()))
    }

    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS ai_requests (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,              -- 'price', 'description', 'market', 'enquiry'
                requested_by TEXT NOT NULL,
                input TEXT NOT NULL,             -- JSON payload
                output TEXT,                     -- JSON payload, set on completion
                token_cost INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS job_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                command TEXT NOT NULL,
                triggered_by TEXT NOT NULL,
                forced INTEGER NOT NULL DEFAULT 0,
                preview INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                outcome TEXT NOT NULL,           -- 'ok', 'partial', 'failed', 'skipped'
                processed INTEGER NOT NULL DEFAULT 0,
                affected INTEGER NOT NULL DEFAULT 0,
                failures INTEGER NOT NULL DEFAULT 0,
                detail TEXT NOT NULL DEFAULT '{}'
            );
         ",
            )
            .map_err(|e| BotError::Storage(format!("audit migration: {e}")))?;
        Ok(())
    }

    // ─── AI requests ──────────────────────────────────────

    /// Write the opening half of an AI audit entry.
    pub fn ai_begin(&self, req: &AiRequest) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO ai_requests (id, kind, requested_by, input, token_cost, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    req.id.to_string(),
                    req.kind.to_string(),
                    req.requested_by.to_string(),
                    req.input.to_string(),
                    req.token_cost,
                    req.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| BotError::Storage(format!("ai_begin: {e}")))?;
        Ok(())
    }

    /// Complete an AI audit entry with output or error. Only these fields may
    /// change after the row is written.
    pub fn ai_complete(
        &self,
        id: Uuid,
        output: Option<&serde_json::Value>,
        token_cost: u32,
        error: Option<&str>,
    ) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE ai_requests
                 SET output = ?1, token_cost = ?2, error = ?3, completed_at = ?4
                 WHERE id = ?5",
                params![
                    output.map(|o| o.to_string()),
                    token_cost,
                    error,
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                ],
            )
            .map_err(|e| BotError::Storage(format!("ai_complete: {e}")))?;
        Ok(())
    }

    /// Recent AI invocations, newest first.
    pub fn recent_ai(&self, limit: usize) -> Result<Vec<serde_json::Value>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, kind, requested_by, token_cost, error, created_at, completed_at
                 FROM ai_requests ORDER BY created_at DESC LIMIT ?1",
            )
            .map_err(|e| BotError::Storage(format!("recent_ai: {e}")))?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(serde_json::json!({
                    "id": row.get::<_, String>(0)?,
                    "kind": row.get::<_, String>(1)?,
                    "requested_by": row.get::<_, String>(2)?,
                    "token_cost": row.get::<_, u32>(3)?,
                    "error": row.get::<_, Option<String>>(4)?,
                    "created_at": row.get::<_, String>(5)?,
                    "completed_at": row.get::<_, Option<String>>(6)?,
                }))
            })
            .map_err(|e| BotError::Storage(format!("recent_ai: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// (invocation count, total tokens) for AI calls created in `[from, to)`.
    pub fn ai_usage_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(u64, u64)> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(token_cost), 0) FROM ai_requests
             WHERE created_at >= ?1 AND created_at < ?2",
            params![from.to_rfc3339(), to.to_rfc3339()],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )
        .map_err(|e| BotError::Storage(format!("ai_usage: {e}")))
    }

    // ─── Job runs ──────────────────────────────────────

    /// Append a job-run record. Returns the row id.
    pub fn record_run(&self, run: &JobRunRecord) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO job_runs
             (command, triggered_by, forced, preview, started_at, finished_at,
              outcome, processed, affected, failures, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                run.command,
                run.triggered_by,
                run.forced as i32,
                run.preview as i32,
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.outcome,
                run.processed,
                run.affected,
                run.failures,
                run.detail.to_string(),
            ],
        )
        .map_err(|e| BotError::Storage(format!("record_run: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    /// Recent runs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<serde_json::Value>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT command, triggered_by, forced, preview, started_at, finished_at,
                        outcome, processed, affected, failures
                 FROM job_runs ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| BotError::Storage(format!("recent_runs: {e}")))?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(serde_json::json!({
                    "command": row.get::<_, String>(0)?,
                    "triggered_by": row.get::<_, String>(1)?,
                    "forced": row.get::<_, i32>(2)? != 0,
                    "preview": row.get::<_, i32>(3)? != 0,
                    "started_at": row.get::<_, String>(4)?,
                    "finished_at": row.get::<_, String>(5)?,
                    "outcome": row.get::<_, String>(6)?,
                    "processed": row.get::<_, u64>(7)?,
                    "affected": row.get::<_, u64>(8)?,
                    "failures": row.get::<_, u64>(9)?,
                }))
            })
            .map_err(|e| BotError::Storage(format!("recent_runs: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Most recent non-preview run of a command, if any.
    pub fn last_run_of(&self, command: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let started: Option<String> = conn
            .query_row(
                "SELECT started_at FROM job_runs
                 WHERE command = ?1 AND preview = 0
                 ORDER BY id DESC LIMIT 1",
                [command],
                |row| row.get(0),
            )
            .ok();
        Ok(started
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdbot_core::domain::AiRequestKind;

    #[test]
    fn test_ai_roundtrip() {
        let db = AuditDb::open_in_memory().unwrap();
        let req = AiRequest::begin(
            AiRequestKind::Price,
            Uuid::new_v4(),
            serde_json::json!({"property_id": "x"}),
        );
        db.ai_begin(&req).unwrap();
        db.ai_complete(req.id, Some(&serde_json::json!({"price": 1200})), 57, None)
            .unwrap();

        let recent = db.recent_ai(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0]["kind"], "price");
        assert_eq!(recent[0]["token_cost"], 57);

        let (count, tokens) = db
            .ai_usage_between(Utc::now() - chrono::Duration::hours(1), Utc::now() + chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(tokens, 57);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.db");
        let db = AuditDb::open(&path).unwrap();
        assert!(path.exists());
        assert!(db.recent_runs(1).unwrap().is_empty());
    }

    #[test]
    fn test_job_run_history() {
        let db = AuditDb::open_in_memory().unwrap();
        let now = Utc::now();
        db.record_run(&JobRunRecord {
            command: "property-cleanup".into(),
            triggered_by: "scheduler".into(),
            forced: false,
            preview: false,
            started_at: now,
            finished_at: now,
            outcome: "ok".into(),
            processed: 40,
            affected: 3,
            failures: 0,
            detail: serde_json::json!({}),
        })
        .unwrap();

        assert!(db.last_run_of("property-cleanup").unwrap().is_some());
        assert!(db.last_run_of("weekly-report").unwrap().is_none());
        let runs = db.recent_runs(5).unwrap();
        assert_eq!(runs[0]["affected"], 3);
    }

    #[test]
    fn test_preview_runs_dont_count_as_last_run() {
        let db = AuditDb::open_in_memory().unwrap();
        let now = Utc::now();
        db.record_run(&JobRunRecord {
            command: "property-cleanup".into(),
            triggered_by: "admin".into(),
            forced: false,
            preview: true,
            started_at: now,
            finished_at: now,
            outcome: "ok".into(),
            processed: 40,
            affected: 0,
            failures: 0,
            detail: serde_json::json!({}),
        })
        .unwrap();
        assert!(db.last_run_of("property-cleanup").unwrap().is_none());
    }
}
