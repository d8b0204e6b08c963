use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::{BulkHistoryItem, HistoryStore, MAX_HISTORY_ITEMS};
use crate::contacts::ContactStore;
use crate::dispatch::BulkStatus;

/// Bulk history and the deleted-contact set, kept in one SQLite database.
#[derive(Clone)]
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn)?;

        info!("History store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        // seq records insertion order; newest first means highest seq first.
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS bulk_history (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                message TEXT NOT NULL,
                recipient_count INTEGER NOT NULL,
                recipient_names TEXT,
                custom_name TEXT,
                timestamp TEXT NOT NULL,
                status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS deleted_contacts (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                contact_id TEXT NOT NULL UNIQUE
            );
            ",
        )
        .context("Failed to run history migrations")?;
        Ok(())
    }
}

/// Columns as stored, before conversion back into domain types.
struct RawRow {
    id: String,
    message: String,
    recipient_count: i64,
    recipient_names: Option<String>,
    custom_name: Option<String>,
    timestamp: String,
    status: String,
}

impl RawRow {
    fn into_item(self) -> Result<BulkHistoryItem> {
        let recipient_names = self
            .recipient_names
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .with_context(|| format!("Corrupt recipient names for history item {}", self.id))?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .with_context(|| format!("Corrupt timestamp for history item {}", self.id))?
            .with_timezone(&Utc);
        let status = BulkStatus::parse(&self.status)
            .with_context(|| format!("Unknown status '{}' for history item {}", self.status, self.id))?;
        let recipient_count = usize::try_from(self.recipient_count)
            .with_context(|| format!("Corrupt recipient count for history item {}", self.id))?;

        Ok(BulkHistoryItem {
            id: self.id,
            message: self.message,
            recipient_count,
            recipient_names,
            custom_name: self.custom_name,
            timestamp,
            status,
        })
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn load(&self) -> Result<Vec<BulkHistoryItem>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, message, recipient_count, recipient_names, custom_name, timestamp, status
             FROM bulk_history
             ORDER BY seq DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    message: row.get(1)?,
                    recipient_count: row.get(2)?,
                    recipient_names: row.get(3)?,
                    custom_name: row.get(4)?,
                    timestamp: row.get(5)?,
                    status: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to load bulk history")?;

        rows.into_iter().map(RawRow::into_item).collect()
    }

    /// Re-saving an existing id moves it to the top.
    async fn save(&self, item: &BulkHistoryItem) -> Result<()> {
        let names_json = item
            .recipient_names
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let timestamp = item.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO bulk_history
             (id, message, recipient_count, recipient_names, custom_name, timestamp, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                &item.id,
                &item.message,
                item.recipient_count as i64,
                names_json,
                &item.custom_name,
                timestamp,
                item.status.as_str(),
            ],
        )
        .context("Failed to save bulk history item")?;

        conn.execute(
            "DELETE FROM bulk_history WHERE seq NOT IN (
                SELECT seq FROM bulk_history ORDER BY seq DESC LIMIT ?1
            )",
            rusqlite::params![MAX_HISTORY_ITEMS as i64],
        )
        .context("Failed to trim bulk history")?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM bulk_history WHERE id = ?1",
            rusqlite::params![id],
        )
        .context("Failed to delete bulk history item")?;
        Ok(())
    }

    async fn rename(&self, id: &str, name: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE bulk_history SET custom_name = ?1 WHERE id = ?2",
            rusqlite::params![name, id],
        )
        .context("Failed to rename bulk history item")?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM bulk_history", [])
            .context("Failed to clear bulk history")?;
        Ok(())
    }
}

#[async_trait]
impl ContactStore for SqliteHistoryStore {
    async fn deleted_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT contact_id FROM deleted_contacts ORDER BY seq ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to load deleted contacts")?;
        Ok(ids)
    }

    async fn delete_contact(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO deleted_contacts (contact_id) VALUES (?1)",
            rusqlite::params![id],
        )
        .context("Failed to delete contact")?;
        Ok(())
    }

    async fn restore_contact(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM deleted_contacts WHERE contact_id = ?1",
            rusqlite::params![id],
        )
        .context("Failed to restore contact")?;
        Ok(())
    }
}
