use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::DispatchConfig;
use crate::phone::{self, CanonicalNumber};

pub const MISSING_FIELDS: &str = "Phone number and message are required";
pub const INVALID_NUMBER: &str = "Invalid Philippine mobile number";
const SENT_FALLBACK: &str = "Message sent successfully";
const FAILED_FALLBACK: &str = "SMS sending failed";

/// Outcome of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub success: bool,
    pub message: String,
}

impl DispatchResult {
    pub fn sent(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkStatus {
    Sent,
    Partial,
    Failed,
}

impl BulkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkStatus::Sent => "sent",
            BulkStatus::Partial => "partial",
            BulkStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(BulkStatus::Sent),
            "partial" => Some(BulkStatus::Partial),
            "failed" => Some(BulkStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for BulkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a bulk run, derived from the per-recipient results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkDispatchResult {
    pub success: bool,
    pub message: String,
    pub success_count: usize,
    pub total: usize,
    pub status: BulkStatus,
}

impl BulkDispatchResult {
    pub fn from_results(results: &[DispatchResult]) -> Self {
        let total = results.len();
        let success_count = results.iter().filter(|r| r.success).count();
        let status = if success_count == 0 {
            BulkStatus::Failed
        } else if success_count == total {
            BulkStatus::Sent
        } else {
            BulkStatus::Partial
        };

        Self {
            success: success_count > 0,
            message: format!("Sent {} of {} messages", success_count, total),
            success_count,
            total,
            status,
        }
    }
}

/// What the proxy said about a request that reached it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyReply {
    Ok { message: String },
    Err { reason: String },
}

impl ProxyReply {
    /// Decode a proxy response body. Only `status == "error"` marks failure;
    /// anything else that parses as JSON counts as accepted.
    pub fn decode(body: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(body).context("Failed to parse SMS proxy response")?;

        let message = value
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        if value.get("status").and_then(Value::as_str) == Some("error") {
            Ok(ProxyReply::Err {
                reason: message.unwrap_or_else(|| FAILED_FALLBACK.to_string()),
            })
        } else {
            Ok(ProxyReply::Ok {
                message: message.unwrap_or_else(|| SENT_FALLBACK.to_string()),
            })
        }
    }
}

#[derive(Serialize)]
struct SendForm<'a> {
    number: &'a str,
    message: &'a str,
    sendername: &'a str,
}

/// Sends messages through the SMS proxy. Never fails: every problem comes
/// back as an unsuccessful `DispatchResult`.
pub struct DispatchClient {
    client: reqwest::Client,
    config: DispatchConfig,
}

impl DispatchClient {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn sender_name(&self) -> &str {
        &self.config.sender_name
    }

    pub async fn send_single(&self, raw_number: &str, message: &str) -> DispatchResult {
        if raw_number.is_empty() || message.is_empty() {
            return DispatchResult::failed(MISSING_FIELDS);
        }

        let number = match phone::normalize(raw_number) {
            Some(number) => number,
            None => {
                debug!("Rejected phone number: {}", raw_number);
                return DispatchResult::failed(INVALID_NUMBER);
            }
        };

        info!("Sending SMS to {} ({} chars)", number, message.chars().count());

        match self.post(&number, message).await {
            Ok(ProxyReply::Ok { message }) => DispatchResult::sent(message),
            Ok(ProxyReply::Err { reason }) => {
                error!("SMS to {} rejected: {}", number, reason);
                DispatchResult::failed(reason)
            }
            Err(e) => {
                error!("SMS to {} failed: {:#}", number, e);
                DispatchResult::failed(format!("{:#}", e))
            }
        }
    }

    /// Send `message` to each recipient in order, one request at a time.
    /// A failed recipient never stops the rest.
    pub async fn send_bulk<S: AsRef<str>>(
        &self,
        raw_numbers: &[S],
        message: &str,
    ) -> Vec<DispatchResult> {
        info!("Bulk send to {} recipient(s)", raw_numbers.len());

        stream::iter(raw_numbers)
            .then(|number| self.send_single(number.as_ref(), message))
            .collect()
            .await
    }

    async fn post(&self, number: &CanonicalNumber, message: &str) -> Result<ProxyReply> {
        let form = SendForm {
            number: number.as_str(),
            message,
            sendername: &self.config.sender_name,
        };

        let response = self
            .client
            .post(&self.config.proxy_url)
            .form(&form)
            .send()
            .await
            .context("Failed to send request to SMS proxy")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read SMS proxy response")?;

        if !status.is_success() {
            anyhow::bail!("HTTP {}: {}", status.as_u16(), body);
        }

        debug!("SMS proxy response: {}", body);
        ProxyReply::decode(&body)
    }
}
