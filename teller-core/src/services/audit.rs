//! Audit log - structured security and ledger events stored in audit.duckdb
//!
//! Events name who did what (user id, account id, reference number) and
//! how it ended (error code). Passwords, hashes, tokens and balances are
//! never written here.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;
use duckdb::Connection;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::migration::MigrationService;
use crate::audit_migrations::AUDIT_MIGRATIONS;

pub const AUDIT_DB_FILE: &str = "audit.duckdb";

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Lower 48 bits carry the millisecond timestamp, upper 16 a counter
fn generate_id() -> u64 {
    let timestamp = now_ms().max(0) as u64;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    (timestamp << 16) | counter
}

/// Current unix timestamp in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn detect_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// Who is driving the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPoint {
    Cli,
    /// Embedded by another program through the facade
    Library,
}

impl EntryPoint {
    fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::Cli => "cli",
            EntryPoint::Library => "library",
        }
    }
}

/// An audit event to be recorded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event: String,
    /// User or account the event is about
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Transaction reference number, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Self::default()
        }
    }

    pub fn with_subject(mut self, subject: impl ToString) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self
    }
}

/// An audit entry as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub timestamp: i64,
    pub entry_point: String,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub subject: Option<String>,
    pub command: Option<String>,
    pub reference: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

const SELECT_COLUMNS: &str = "SELECT id, timestamp, entry_point, app_version, platform, \
     event, subject, command, reference, error_code, error_message FROM sys_audit";

pub struct AuditLog {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    entry_point: EntryPoint,
    app_version: String,
    platform: &'static str,
}

impl AuditLog {
    /// Open or create audit.duckdb in the teller directory
    pub fn new(
        teller_dir: &Path,
        entry_point: EntryPoint,
        app_version: impl Into<String>,
    ) -> Result<Self> {
        let db_path = teller_dir.join(AUDIT_DB_FILE);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open audit log at {}", db_path.display()))?;
        MigrationService::with_migrations(&conn, AUDIT_MIGRATIONS).run_pending()?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            entry_point,
            app_version: app_version.into(),
            platform: detect_platform(),
        })
    }

    pub fn record(&self, event: AuditEvent) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO sys_audit (
                id, timestamp, entry_point, app_version, platform,
                event, subject, command, reference, error_code, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            duckdb::params![
                generate_id(),
                now_ms(),
                self.entry_point.as_str(),
                &self.app_version,
                self.platform,
                &event.event,
                &event.subject,
                &event.command,
                &event.reference,
                &event.error_code,
                &event.error_message,
            ],
        )?;
        Ok(())
    }

    /// Record a CLI command invocation
    pub fn record_command(&self, command: &str) -> Result<()> {
        self.record(AuditEvent::new("command_executed").with_command(command))
    }

    /// Most recent entries first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        self.query(
            &format!("{} ORDER BY timestamp DESC, id DESC LIMIT ?", SELECT_COLUMNS),
            limit,
        )
    }

    /// Entries that carry an error code, most recent first
    pub fn get_errors(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        self.query(
            &format!(
                "{} WHERE error_code IS NOT NULL ORDER BY timestamp DESC, id DESC LIMIT ?",
                SELECT_COLUMNS
            ),
            limit,
        )
    }

    fn query(&self, sql: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                entry_point: row.get(2)?,
                app_version: row.get(3)?,
                platform: row.get(4)?,
                event: row.get(5)?,
                subject: row.get(6)?,
                command: row.get(7)?,
                reference: row.get(8)?,
                error_code: row.get(9)?,
                error_message: row.get(10)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM sys_audit", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete entries older than the given unix timestamp (ms)
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM sys_audit WHERE timestamp < ?", [timestamp_ms])?;
        Ok(deleted as u64)
    }

    /// Copy the audit database to `output_path`
    pub fn export(&self, output_path: &Path) -> Result<PathBuf> {
        let conn = self.conn.lock();
        conn.execute_batch("CHECKPOINT")?;
        std::fs::copy(&self.db_path, output_path).with_context(|| {
            format!("Failed to export audit log to {}", output_path.display())
        })?;
        Ok(output_path.to_path_buf())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_audit_log_creation() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();

        assert!(audit.db_path().exists());
        assert_eq!(audit.count().unwrap(), 0);
    }

    #[test]
    fn test_record_and_read_back() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path(), EntryPoint::Library, "2.0.0").unwrap();

        audit
            .record(
                AuditEvent::new("deposit_completed")
                    .with_subject("acc-1")
                    .with_reference("TX20260101-ABCDEFGHIJ"),
            )
            .unwrap();

        let entries = audit.get_recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "deposit_completed");
        assert_eq!(entries[0].subject.as_deref(), Some("acc-1"));
        assert_eq!(entries[0].reference.as_deref(), Some("TX20260101-ABCDEFGHIJ"));
        assert_eq!(entries[0].entry_point, "library");
        assert_eq!(entries[0].app_version, "2.0.0");
    }

    #[test]
    fn test_errors_filter() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();

        audit.record_command("deposit").unwrap();
        audit
            .record(
                AuditEvent::new("login_failed")
                    .with_subject("user-1")
                    .with_error("INVALID_CREDENTIALS", "Invalid username or password"),
            )
            .unwrap();

        let errors = audit.get_errors(10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_code.as_deref(), Some("INVALID_CREDENTIALS"));
        assert_eq!(audit.get_recent(10).unwrap().len(), 2);
    }

    #[test]
    fn test_count_and_delete() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();

        for name in ["a", "b", "c"] {
            audit.record(AuditEvent::new(name)).unwrap();
        }
        assert_eq!(audit.count().unwrap(), 3);

        assert_eq!(audit.delete_before(now_ms() + 1000).unwrap(), 3);
        assert_eq!(audit.count().unwrap(), 0);
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let dir = tempdir().unwrap();
        {
            let audit = AuditLog::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
            audit.record(AuditEvent::new("user_registered")).unwrap();
        }
        let audit = AuditLog::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
        assert_eq!(audit.count().unwrap(), 1);
    }

    #[test]
    fn test_export() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
        audit.record(AuditEvent::new("account_opened")).unwrap();

        let export_path = dir.path().join("export.duckdb");
        audit.export(&export_path).unwrap();
        assert!(export_path.exists());
    }
}
