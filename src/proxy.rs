//! SMS proxy: accepts canonical numbers from the dispatch client, rewrites
//! them into the local format and relays them to the upstream webhook.

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::FormRejection, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{Config, WebhookConfig};
use crate::contacts::{self, Contact, ContactStore};
use crate::history::SqliteHistoryStore;
use crate::phone;

#[derive(Clone)]
pub struct ProxyState {
    client: reqwest::Client,
    webhook: Arc<WebhookConfig>,
    contacts: Arc<Vec<Contact>>,
    contact_store: Arc<dyn ContactStore>,
}

impl ProxyState {
    pub fn new(
        webhook: WebhookConfig,
        contacts: Vec<Contact>,
        contact_store: Arc<dyn ContactStore>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook: Arc::new(webhook),
            contacts: Arc::new(contacts),
            contact_store,
        }
    }
}

type JsonReply = (StatusCode, Json<Value>);

fn error_reply(status: StatusCode, message: &str) -> JsonReply {
    (status, Json(json!({ "status": "error", "message": message })))
}

#[derive(Debug, Deserialize)]
struct ContactQuery {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SmsForm {
    number: Option<String>,
    message: Option<String>,
    sendername: Option<String>,
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/api/sms", post(relay_sms).fallback(method_not_allowed))
        .route("/api/contacts", get(list_contacts))
        .route("/api/contacts/{id}", delete(delete_contact))
        .route("/api/contacts/{id}/restore", post(restore_contact))
        .with_state(state)
}

async fn relay_sms(
    State(state): State<ProxyState>,
    form: Result<Form<SmsForm>, FormRejection>,
) -> JsonReply {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            warn!("Rejected SMS request body: {}", rejection.body_text());
            return error_reply(rejection.status(), "Invalid form body");
        }
    };

    let number = phone::to_local(form.number.as_deref().unwrap_or_default());
    let message = form.message.unwrap_or_default();
    let sender = form
        .sendername
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| state.webhook.default_sender_name.clone());

    info!("Relaying SMS to {} as {}", number, sender);

    match relay(&state, &number, &message, &sender).await {
        Ok(data) => (StatusCode::OK, Json(data)),
        Err(e) => {
            error!("SMS proxy error: {:#}", e);
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send SMS")
        }
    }
}

/// Post to the webhook with every field under `customData[...]`. The
/// webhook's JSON is passed back whatever its HTTP status.
async fn relay(state: &ProxyState, number: &str, message: &str, sender: &str) -> Result<Value> {
    let params = [
        ("customData[number]", number),
        ("customData[message]", message),
        ("customData[sendername]", sender),
    ];

    let response = state
        .client
        .post(&state.webhook.url)
        .form(&params)
        .send()
        .await
        .context("Failed to reach SMS webhook")?;

    debug!("SMS webhook answered {}", response.status());

    response
        .json()
        .await
        .context("Failed to parse SMS webhook response")
}

async fn method_not_allowed() -> JsonReply {
    error_reply(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Directory minus deleted contacts, optionally narrowed by `?q=`.
async fn list_contacts(
    State(state): State<ProxyState>,
    Query(query): Query<ContactQuery>,
) -> Result<Json<Vec<Contact>>, JsonReply> {
    let deleted = state.contact_store.deleted_ids().await.map_err(|e| {
        error!("Failed to load deleted contacts: {:#}", e);
        error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load contacts")
    })?;

    let visible = contacts::visible_contacts(&state.contacts, &deleted);
    Ok(Json(contacts::filter_contacts(
        &visible,
        query.q.as_deref().unwrap_or_default(),
    )))
}

async fn delete_contact(State(state): State<ProxyState>, Path(id): Path<String>) -> JsonReply {
    match state.contact_store.delete_contact(&id).await {
        Ok(()) => {
            info!("Deleted contact {}", id);
            (StatusCode::OK, Json(json!({ "status": "success", "id": id })))
        }
        Err(e) => {
            error!("Failed to delete contact {}: {:#}", id, e);
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete contact")
        }
    }
}

async fn restore_contact(State(state): State<ProxyState>, Path(id): Path<String>) -> JsonReply {
    match state.contact_store.restore_contact(&id).await {
        Ok(()) => {
            info!("Restored contact {}", id);
            (StatusCode::OK, Json(json!({ "status": "success", "id": id })))
        }
        Err(e) => {
            error!("Failed to restore contact {}: {:#}", id, e);
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to restore contact")
        }
    }
}

/// Serve the proxy until Ctrl-C.
pub async fn run(config: &Config) -> Result<()> {
    let store = SqliteHistoryStore::open(&config.history.database_path)?;
    let state = ProxyState::new(
        config.webhook.clone(),
        config.contacts.clone(),
        Arc::new(store),
    );
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;

    info!("SMS proxy listening on http://{}", config.server.bind);
    info!("  Upstream webhook: {}", config.webhook.url);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down SMS proxy");
        })
        .await
        .context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::contacts::{default_contacts, MemoryContactStore};
    use crate::dispatch::{DispatchClient, DispatchResult};
    use crate::testutil;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    type Received = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn stub_webhook(
        State(received): State<Received>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<Value> {
        let number = form.get("customData[number]").cloned().unwrap_or_default();
        received.lock().await.push(form);
        if number.is_empty() {
            Json(json!({ "status": "error", "message": "Number is required" }))
        } else {
            Json(json!({ "status": "success", "message": "SMS queued", "number": number }))
        }
    }

    /// Proxy wired to a recording webhook; returns the proxy base URL.
    async fn spawn_proxy() -> (String, Received) {
        let received: Received = Arc::default();
        let webhook = Router::new()
            .route("/webhook/send_sms.php", post(stub_webhook))
            .with_state(received.clone());
        let webhook_addr = testutil::spawn(webhook).await;

        let state = ProxyState::new(
            WebhookConfig {
                url: format!("http://{}/webhook/send_sms.php", webhook_addr),
                default_sender_name: "NOLACRM".to_string(),
            },
            default_contacts(),
            Arc::new(MemoryContactStore::new()),
        );
        let proxy_addr = testutil::spawn(router(state)).await;
        (format!("http://{}", proxy_addr), received)
    }

    #[tokio::test]
    async fn test_relay_rewrites_number_and_wraps_fields() {
        let (base, received) = spawn_proxy().await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/sms", base))
            .form(&[
                ("number", "+639171234567"),
                ("message", "hello"),
                ("sendername", "ACME"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], "SMS queued");

        let received = received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["customData[number]"], "09171234567");
        assert_eq!(received[0]["customData[message]"], "hello");
        assert_eq!(received[0]["customData[sendername]"], "ACME");
    }

    #[tokio::test]
    async fn test_relay_defaults_sender_name() {
        let (base, received) = spawn_proxy().await;

        reqwest::Client::new()
            .post(format!("{}/api/sms", base))
            .form(&[("number", "9171234567"), ("message", "hi")])
            .send()
            .await
            .unwrap();

        let received = received.lock().await;
        assert_eq!(received[0]["customData[number]"], "09171234567");
        assert_eq!(received[0]["customData[sendername]"], "NOLACRM");
    }

    #[tokio::test]
    async fn test_webhook_errors_pass_through() {
        let (base, _) = spawn_proxy().await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/sms", base))
            .form(&[("message", "hi")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Number is required");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_500() {
        let closed = testutil::closed_port().await;
        let state = ProxyState::new(
            WebhookConfig {
                url: format!("http://{}/webhook", closed),
                default_sender_name: "NOLACRM".to_string(),
            },
            Vec::new(),
            Arc::new(MemoryContactStore::new()),
        );
        let addr = testutil::spawn(router(state)).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/api/sms", addr))
            .form(&[("number", "+639171234567"), ("message", "hi")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        let body: Value = response.json().await.unwrap();
        assert_eq!(
            body,
            json!({ "status": "error", "message": "Failed to send SMS" })
        );
    }

    #[tokio::test]
    async fn test_non_post_is_405() {
        let (base, _) = spawn_proxy().await;

        let response = reqwest::get(format!("{}/api/sms", base)).await.unwrap();
        assert_eq!(response.status(), 405);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], "Method not allowed");
    }

    #[tokio::test]
    async fn test_contacts_endpoint() {
        let (base, _) = spawn_proxy().await;

        let contacts: Vec<Contact> = reqwest::get(format!("{}/api/contacts", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(contacts, default_contacts());
    }

    #[tokio::test]
    async fn test_non_form_body_gets_json_error() {
        let (base, received) = spawn_proxy().await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/sms", base))
            .json(&json!({ "number": "+639171234567", "message": "hi" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 415);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Invalid form body");
        assert!(received.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_contacts_search() {
        let (base, _) = spawn_proxy().await;

        let contacts: Vec<Contact> = reqwest::get(format!("{}/api/contacts?q=jane", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let names: Vec<&str> = contacts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Jane Smith"]);
    }

    #[tokio::test]
    async fn test_deleted_contacts_are_hidden_until_restored() {
        let (base, _) = spawn_proxy().await;
        let client = reqwest::Client::new();
        let ids = |contacts: Vec<Contact>| -> Vec<String> {
            contacts.into_iter().map(|c| c.id).collect()
        };

        let response = client
            .delete(format!("{}/api/contacts/3", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let listed: Vec<Contact> = client
            .get(format!("{}/api/contacts", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ids(listed), ["1", "2", "4", "5"]);

        client
            .post(format!("{}/api/contacts/3/restore", base))
            .send()
            .await
            .unwrap();

        let listed: Vec<Contact> = client
            .get(format!("{}/api/contacts", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ids(listed), ["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_dispatch_through_proxy_end_to_end() {
        let (base, received) = spawn_proxy().await;
        let client = DispatchClient::new(DispatchConfig {
            proxy_url: format!("{}/api/sms", base),
            sender_name: "NOLACRM".to_string(),
        });

        let result = client.send_single("+63 917 123 4567", "hi").await;
        assert_eq!(result, DispatchResult::sent("SMS queued"));
        assert_eq!(
            received.lock().await[0]["customData[number]"],
            "09171234567"
        );
    }
}
