use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::dispatch::DispatchResult;

/// Lifecycle of one outbound message. A failed message stays failed; the
/// user has to compose a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Composing,
    Sending,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub id: String,
    pub recipient: String,
    pub body: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    /// Dispatch outcome text once the message is final.
    pub detail: Option<String>,
}

/// In-memory, insertion-ordered list of messages shown to the user before
/// the server has answered.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<OutboundMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compose(&mut self, recipient: &str, body: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.messages.push(OutboundMessage {
            id: id.clone(),
            recipient: recipient.to_string(),
            body: body.to_string(),
            status: MessageStatus::Composing,
            created_at: Utc::now(),
            detail: None,
        });
        id
    }

    pub fn mark_sending(&mut self, id: &str) -> Result<()> {
        let message = self.get_mut(id)?;
        if message.status != MessageStatus::Composing {
            anyhow::bail!(
                "Cannot send message {} while it is {:?}",
                id,
                message.status
            );
        }
        message.status = MessageStatus::Sending;
        Ok(())
    }

    /// Record the dispatch outcome for a message that is being sent.
    pub fn complete(&mut self, id: &str, result: &DispatchResult) -> Result<MessageStatus> {
        let message = self.get_mut(id)?;
        if message.status != MessageStatus::Sending {
            anyhow::bail!(
                "Cannot complete message {} while it is {:?}",
                id,
                message.status
            );
        }
        message.status = if result.success {
            MessageStatus::Delivered
        } else {
            MessageStatus::Failed
        };
        message.detail = Some(result.message.clone());
        Ok(message.status)
    }

    pub fn list(&self) -> &[OutboundMessage] {
        &self.messages
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut OutboundMessage> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| anyhow::anyhow!("Unknown message: {}", id))
    }
}
