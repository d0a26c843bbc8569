//! SQLite-backed storage for obligations and the reminder ledger.
//!
//! Dates are stored as `YYYY-MM-DD`, timestamps as RFC 3339, reminder
//! rules as a JSON document.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dutybell_core::error::{DutyBellError, Result};
use dutybell_core::traits::ObligationStore;
use dutybell_core::types::{
    DeliveryStatus, NewReminderLog, Obligation, ReminderLog, ReminderRules, TaskStatus, TaskType,
    TriggerKind,
};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const OBLIGATION_COLUMNS: &str = "id, task_type, title, description, status, start_date, due_date, \
     reminder_rules, last_notified_at, reference_no, department, vendor, amount, assigned_to, \
     created_by, completed_at, completed_by, deleted_at, deleted_by, created_at, updated_at";

/// SQLite store shared by the gateway, the CLI and the schedule loop.
pub struct ReminderDb {
    conn: Mutex<Connection>,
}

impl ReminderDb {
    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| storage("DB open", e))?;

        // WAL for concurrent readers (gateway + schedule loop)
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        Self::with_connection(conn)
    }

    /// Fresh in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| storage("DB open", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DutyBellError::Storage(format!("Lock: {e}")))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                task_type TEXT NOT NULL,              -- REPAIR, AMC, LETTER, OTHER
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'PENDING',
                start_date TEXT NOT NULL,
                due_date TEXT NOT NULL,
                reminder_rules TEXT NOT NULL,         -- JSON
                last_notified_at TEXT,                -- YYYY-MM-DD, dedup marker
                reference_no TEXT,
                department TEXT,
                vendor TEXT,
                amount REAL,
                assigned_to TEXT,
                created_by TEXT,
                completed_at TEXT,
                completed_by TEXT,
                deleted_at TEXT,
                deleted_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_active ON tasks(status, deleted_at);

            -- Append-only reminder ledger
            CREATE TABLE IF NOT EXISTS reminder_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT,                         -- NULL for digest runs
                channel TEXT NOT NULL,
                status TEXT NOT NULL,                 -- SENT, FAILED
                error_message TEXT,
                trigger_kind TEXT NOT NULL DEFAULT 'SCHEDULED',
                sent_at TEXT NOT NULL
            );
            ",
            )
            .map_err(|e| storage("Migration", e))
    }

    // ─── Obligations ──────────────────────────────────────

    /// Insert or replace an obligation.
    pub fn insert_obligation(&self, o: &Obligation) -> Result<()> {
        let rules = serde_json::to_string(&o.reminder_rules)?;
        self.lock()?
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO tasks ({OBLIGATION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)"
                ),
                params![
                    o.id,
                    o.task_type.as_str(),
                    o.title,
                    o.description,
                    o.status.as_str(),
                    o.start_date.to_string(),
                    o.due_date.to_string(),
                    rules,
                    o.last_notified_at.map(|d| d.to_string()),
                    o.reference_no,
                    o.department,
                    o.vendor,
                    o.amount,
                    o.assigned_to,
                    o.created_by,
                    o.completed_at.map(|t| t.to_rfc3339()),
                    o.completed_by,
                    o.deleted_at.map(|t| t.to_rfc3339()),
                    o.deleted_by,
                    o.created_at.to_rfc3339(),
                    o.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| storage("Save task", e))?;
        Ok(())
    }

    /// Non-deleted obligations eligible for reminders, earliest due first.
    pub fn active_obligations(&self) -> Result<Vec<Obligation>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {OBLIGATION_COLUMNS} FROM tasks
                 WHERE deleted_at IS NULL AND status IN ('PENDING', 'IN_PROGRESS')
                 ORDER BY due_date, id"
            ))
            .map_err(|e| storage("Fetch tasks", e))?;
        let rows = stmt
            .query_map([], row_to_obligation)
            .map_err(|e| storage("Fetch tasks", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage("Fetch tasks", e))
    }

    /// A non-deleted obligation by id.
    pub fn obligation(&self, id: &str) -> Result<Obligation> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {OBLIGATION_COLUMNS} FROM tasks WHERE id = ?1 AND deleted_at IS NULL"),
            [id],
            row_to_obligation,
        )
        .optional()
        .map_err(|e| storage("Get task", e))?
        .ok_or_else(|| DutyBellError::NotFound(id.to_string()))
    }

    /// Overwrite the dedup marker.
    pub fn set_last_notified(&self, id: &str, date: NaiveDate) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE tasks SET last_notified_at = ?1 WHERE id = ?2",
                params![date.to_string(), id],
            )
            .map_err(|e| storage("Update last_notified_at", e))?;
        Ok(())
    }

    /// Move an obligation to a new lifecycle status.
    pub fn set_status(&self, id: &str, status: TaskStatus, actor: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let (completed_at, completed_by) = if status == TaskStatus::Completed {
            (Some(now.clone()), actor)
        } else {
            (None, None)
        };
        let changed = self
            .lock()?
            .execute(
                "UPDATE tasks SET status = ?1, completed_at = ?2, completed_by = ?3, updated_at = ?4
                 WHERE id = ?5 AND deleted_at IS NULL",
                params![status.as_str(), completed_at, completed_by, now, id],
            )
            .map_err(|e| storage("Update status", e))?;
        if changed == 0 {
            return Err(DutyBellError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Soft-delete an obligation. It stays in the table but never reaches the engine again.
    pub fn soft_delete(&self, id: &str, actor: Option<&str>) -> Result<()> {
        let changed = self
            .lock()?
            .execute(
                "UPDATE tasks SET deleted_at = ?1, deleted_by = ?2 WHERE id = ?3 AND deleted_at IS NULL",
                params![Utc::now().to_rfc3339(), actor, id],
            )
            .map_err(|e| storage("Delete task", e))?;
        if changed == 0 {
            return Err(DutyBellError::NotFound(id.to_string()));
        }
        Ok(())
    }

    // ─── Reminder ledger ──────────────────────────────────────

    /// Append a ledger row.
    pub fn insert_log(&self, entry: &NewReminderLog) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO reminder_logs (task_id, channel, status, error_message, trigger_kind, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.task_id,
                entry.channel,
                entry.status.as_str(),
                entry.error_message,
                entry.trigger.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| storage("Insert reminder log", e))?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent ledger rows, newest first.
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<ReminderLog>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, task_id, channel, status, error_message, trigger_kind, sent_at
                 FROM reminder_logs ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| storage("Fetch reminder logs", e))?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(ReminderLog {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    channel: row.get(2)?,
                    status: DeliveryStatus::parse(&row.get::<_, String>(3)?),
                    error_message: row.get(4)?,
                    trigger: TriggerKind::parse(&row.get::<_, String>(5)?),
                    sent_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
                })
            })
            .map_err(|e| storage("Fetch reminder logs", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage("Fetch reminder logs", e))
    }

    /// Reachability check.
    pub fn check(&self) -> Result<()> {
        self.lock()?
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get::<_, i64>(0))
            .map_err(|e| storage("Ping", e))?;
        Ok(())
    }
}

#[async_trait]
impl ObligationStore for ReminderDb {
    async fn fetch_active(&self) -> Result<Vec<Obligation>> {
        self.active_obligations()
    }

    async fn get(&self, id: &str) -> Result<Obligation> {
        self.obligation(id)
    }

    async fn mark_notified(&self, id: &str, date: NaiveDate) -> Result<()> {
        self.set_last_notified(id, date)
    }

    async fn append_log(&self, entry: NewReminderLog) -> Result<i64> {
        self.insert_log(&entry)
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

fn storage(what: &str, e: rusqlite::Error) -> DutyBellError {
    DutyBellError::Storage(format!("{what}: {e}"))
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    // Tolerate full timestamps written by other producers.
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| parse_timestamp(idx, &s))
        .transpose()
}

fn row_to_obligation(row: &Row<'_>) -> rusqlite::Result<Obligation> {
    let status_str: String = row.get(4)?;
    let status = TaskStatus::parse(&status_str).unwrap_or(TaskStatus::Pending);
    let rules_json: String = row.get(7)?;
    let reminder_rules: ReminderRules =
        serde_json::from_str(&rules_json).map_err(|e| conversion_error(7, e))?;

    Ok(Obligation {
        id: row.get(0)?,
        task_type: TaskType::parse(&row.get::<_, String>(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        status,
        start_date: parse_date(5, &row.get::<_, String>(5)?)?,
        due_date: parse_date(6, &row.get::<_, String>(6)?)?,
        reminder_rules,
        last_notified_at: row
            .get::<_, Option<String>>(8)?
            .map(|s| parse_date(8, &s))
            .transpose()?,
        reference_no: row.get(9)?,
        department: row.get(10)?,
        vendor: row.get(11)?,
        amount: row.get(12)?,
        assigned_to: row.get(13)?,
        created_by: row.get(14)?,
        completed_at: opt_timestamp(row, 15)?,
        completed_by: row.get(16)?,
        deleted_at: opt_timestamp(row, 17)?,
        deleted_by: row.get(18)?,
        created_at: parse_timestamp(19, &row.get::<_, String>(19)?)?,
        updated_at: parse_timestamp(20, &row.get::<_, String>(20)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample(title: &str, due: NaiveDate) -> Obligation {
        let mut o = Obligation::new(TaskType::Letter, title, date(2026, 1, 1), due);
        o.department = Some("Accounts".into());
        o.amount = Some(1250.5);
        o
    }

    #[test]
    fn test_open_on_disk_and_migrate() {
        let dir = std::env::temp_dir().join(format!("dutybell-db-{}", uuid::Uuid::new_v4()));
        let db = ReminderDb::open(&dir.join("nested").join("test.db")).unwrap();
        assert!(db.active_obligations().unwrap().is_empty());
        db.check().unwrap();
        drop(db);
        // reopening runs migrations again without error
        ReminderDb::open(&dir.join("nested").join("test.db")).unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_and_load_obligation() {
        let db = ReminderDb::open_in_memory().unwrap();
        let mut o = sample("Reply to audit query", date(2026, 4, 30));
        o.last_notified_at = Some(date(2026, 4, 1));
        db.insert_obligation(&o).unwrap();

        let loaded = db.obligation(&o.id).unwrap();
        assert_eq!(loaded.title, "Reply to audit query");
        assert_eq!(loaded.task_type, TaskType::Letter);
        assert_eq!(loaded.due_date, date(2026, 4, 30));
        assert_eq!(loaded.last_notified_at, Some(date(2026, 4, 1)));
        assert_eq!(loaded.reminder_rules, ReminderRules::default());
        assert_eq!(loaded.department.as_deref(), Some("Accounts"));
        assert_eq!(loaded.amount, Some(1250.5));
    }

    #[test]
    fn test_active_filter_excludes_closed_and_deleted() {
        let db = ReminderDb::open_in_memory().unwrap();
        let open = sample("open", date(2026, 5, 2));
        let mut working = sample("working", date(2026, 5, 1));
        working.status = TaskStatus::InProgress;
        let done = sample("done", date(2026, 5, 3));
        let cancelled = sample("cancelled", date(2026, 5, 4));
        let deleted = sample("deleted", date(2026, 5, 5));
        for o in [&open, &working, &done, &cancelled, &deleted] {
            db.insert_obligation(o).unwrap();
        }
        db.set_status(&done.id, TaskStatus::Completed, Some("clerk")).unwrap();
        db.set_status(&cancelled.id, TaskStatus::Cancelled, None).unwrap();
        db.soft_delete(&deleted.id, Some("clerk")).unwrap();

        let active = db.active_obligations().unwrap();
        let titles: Vec<_> = active.iter().map(|o| o.title.as_str()).collect();
        assert_eq!(titles, vec!["working", "open"]);

        let completed = db.obligation(&done.id).unwrap();
        assert!(completed.completed_at.is_some());
        assert_eq!(completed.completed_by.as_deref(), Some("clerk"));
    }

    #[test]
    fn test_get_missing_or_deleted_is_not_found() {
        let db = ReminderDb::open_in_memory().unwrap();
        assert!(matches!(db.obligation("nope"), Err(DutyBellError::NotFound(_))));

        let o = sample("gone", date(2026, 5, 5));
        db.insert_obligation(&o).unwrap();
        db.soft_delete(&o.id, None).unwrap();
        assert!(matches!(db.obligation(&o.id), Err(DutyBellError::NotFound(_))));
        assert!(matches!(db.soft_delete(&o.id, None), Err(DutyBellError::NotFound(_))));
    }

    #[test]
    fn test_mark_notified_is_idempotent() {
        let db = ReminderDb::open_in_memory().unwrap();
        let o = sample("x", date(2026, 5, 5));
        db.insert_obligation(&o).unwrap();

        db.set_last_notified(&o.id, date(2026, 5, 1)).unwrap();
        db.set_last_notified(&o.id, date(2026, 5, 1)).unwrap();
        assert_eq!(db.obligation(&o.id).unwrap().last_notified_at, Some(date(2026, 5, 1)));
    }

    #[test]
    fn test_logs_are_appended_newest_first() {
        let db = ReminderDb::open_in_memory().unwrap();
        let first = db
            .insert_log(&NewReminderLog {
                task_id: Some("t1".into()),
                channel: "telegram".into(),
                status: DeliveryStatus::Sent,
                error_message: None,
                trigger: TriggerKind::Scheduled,
            })
            .unwrap();
        let second = db
            .insert_log(&NewReminderLog {
                task_id: None,
                channel: "telegram".into(),
                status: DeliveryStatus::Failed,
                error_message: Some("Config missing".into()),
                trigger: TriggerKind::Manual,
            })
            .unwrap();
        assert!(second > first);

        let logs = db.recent_logs(10).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, second);
        assert_eq!(logs[0].task_id, None);
        assert_eq!(logs[0].status, DeliveryStatus::Failed);
        assert_eq!(logs[0].trigger, TriggerKind::Manual);
        assert_eq!(logs[1].task_id.as_deref(), Some("t1"));

        assert_eq!(db.recent_logs(1).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_rules_surface_as_fetch_error() {
        let db = ReminderDb::open_in_memory().unwrap();
        let o = sample("x", date(2026, 5, 5));
        db.insert_obligation(&o).unwrap();
        db.lock()
            .unwrap()
            .execute("UPDATE tasks SET reminder_rules = 'not json'", [])
            .unwrap();
        assert!(matches!(db.active_obligations(), Err(DutyBellError::Storage(_))));
    }
}
