use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::phone::{self, CanonicalNumber};

/// A contact as served by `/api/contacts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    /// Stored as typed; normalized only when a message is sent.
    pub phone: String,
}

impl Contact {
    pub fn canonical_phone(&self) -> Option<CanonicalNumber> {
        phone::normalize(&self.phone)
    }
}

/// The built-in mock directory.
pub fn default_contacts() -> Vec<Contact> {
    [
        ("1", "Raely Ivan Reyes", "0976 176 1036"),
        ("2", "David Monzon", "0970 812 9927"),
        ("3", "Nola Support", "09987654321"),
        ("4", "John Doe", "09223334445"),
        ("5", "Jane Smith", "09556667778"),
    ]
    .into_iter()
    .map(|(id, name, phone)| Contact {
        id: id.to_string(),
        name: name.to_string(),
        phone: phone.to_string(),
    })
    .collect()
}

/// Contacts whose name contains `query` (case-insensitive) or whose phone
/// contains it verbatim. A blank query matches everything.
pub fn filter_contacts(contacts: &[Contact], query: &str) -> Vec<Contact> {
    let query = query.trim();
    if query.is_empty() {
        return contacts.to_vec();
    }

    let needle = query.to_lowercase();
    contacts
        .iter()
        .filter(|c| c.name.to_lowercase().contains(&needle) || c.phone.contains(query))
        .cloned()
        .collect()
}

/// The directory minus contacts the user has deleted.
pub fn visible_contacts(contacts: &[Contact], deleted_ids: &[String]) -> Vec<Contact> {
    contacts
        .iter()
        .filter(|c| !deleted_ids.contains(&c.id))
        .cloned()
        .collect()
}

/// Persisted set of deleted contact ids. Deleting hides a directory entry;
/// restoring brings it back.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn deleted_ids(&self) -> Result<Vec<String>>;
    async fn delete_contact(&self, id: &str) -> Result<()>;
    async fn restore_contact(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryContactStore {
    deleted: Mutex<Vec<String>>,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn deleted_ids(&self) -> Result<Vec<String>> {
        Ok(self.deleted.lock().await.clone())
    }

    async fn delete_contact(&self, id: &str) -> Result<()> {
        let mut deleted = self.deleted.lock().await;
        if !deleted.iter().any(|d| d == id) {
            deleted.push(id.to_string());
        }
        Ok(())
    }

    async fn restore_contact(&self, id: &str) -> Result<()> {
        self.deleted.lock().await.retain(|d| d != id);
        Ok(())
    }
}
