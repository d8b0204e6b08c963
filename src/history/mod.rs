pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::dispatch::{BulkDispatchResult, BulkStatus};

pub use sqlite::SqliteHistoryStore;

/// Newest entries kept; older ones are dropped on save.
pub const MAX_HISTORY_ITEMS: usize = 50;

/// One recorded bulk send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkHistoryItem {
    pub id: String,
    pub message: String,
    pub recipient_count: usize,
    pub recipient_names: Option<Vec<String>>,
    /// User-chosen label, set via `rename`.
    pub custom_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: BulkStatus,
}

impl BulkHistoryItem {
    pub fn new(message: &str, recipient_names: Vec<String>, summary: &BulkDispatchResult) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message: message.to_string(),
            recipient_count: summary.total,
            recipient_names: if recipient_names.is_empty() {
                None
            } else {
                Some(recipient_names)
            },
            custom_name: None,
            timestamp: Utc::now(),
            status: summary.status,
        }
    }
}

/// Persistence port for bulk history, newest first.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn load(&self) -> Result<Vec<BulkHistoryItem>>;
    /// Insert at the top. An item whose id is already stored replaces the
    /// old entry rather than duplicating it.
    async fn save(&self, item: &BulkHistoryItem) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn rename(&self, id: &str, name: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Non-persistent store, for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    items: Mutex<Vec<BulkHistoryItem>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load(&self) -> Result<Vec<BulkHistoryItem>> {
        Ok(self.items.lock().await.clone())
    }

    async fn save(&self, item: &BulkHistoryItem) -> Result<()> {
        let mut items = self.items.lock().await;
        items.retain(|existing| existing.id != item.id);
        items.insert(0, item.clone());
        items.truncate(MAX_HISTORY_ITEMS);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.items.lock().await.retain(|item| item.id != id);
        Ok(())
    }

    async fn rename(&self, id: &str, name: &str) -> Result<()> {
        for item in self.items.lock().await.iter_mut() {
            if item.id == id {
                item.custom_name = Some(name.to_string());
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.items.lock().await.clear();
        Ok(())
    }
}

/// Short age label for a history entry: `now`, `5m`, `3h`, `2d`, or the date.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let mins = (now - then).num_minutes();
    let hours = mins / 60;
    let days = hours / 24;

    if mins < 1 {
        "now".to_string()
    } else if mins < 60 {
        format!("{}m", mins)
    } else if hours < 24 {
        format!("{}h", hours)
    } else if days < 7 {
        format!("{}d", days)
    } else {
        then.format("%Y-%m-%d").to_string()
    }
}
