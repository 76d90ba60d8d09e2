use crate::outcome::{TaskExecutor, TaskOutcome};
use crate::{ExecutionError, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use relay_core::{
    DateTime, Json, JsonMap, TaskDetails, TaskKind, TaskRecord, TaskStore, Webhook, WebhookStore,
};
use serde_json::json;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Fixed per-request timeout for deliveries
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP seam for webhook deliveries; returns the response status code.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// POST a JSON body with the given headers
    async fn post(&self, url: &str, headers: &HashMap<String, String>, body: &Json)
        -> Result<u16>;
}

/// reqwest-backed transport with the fixed request timeout
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: &Json,
    ) -> Result<u16> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExecutionError::transport(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// HMAC-SHA256 of the JSON-serialized payload, hex-encoded.
///
/// The signature covers the payload alone while the transmitted body is
/// the `{event, data, timestamp}` envelope — receivers verify against the
/// extracted `data`, not the raw body. Existing receivers depend on this,
/// so it must not be changed without a coordinated break.
pub fn compute_signature(secret: &str, payload: &Json) -> Result<String> {
    let serialized = serde_json::to_string(payload)
        .map_err(|e| ExecutionError::configuration(format!("unserializable payload: {e}")))?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExecutionError::configuration(format!("invalid webhook secret: {e}")))?;
    mac.update(serialized.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Delivery headers: the endpoint's custom headers plus the fixed set.
/// Fixed headers win — a custom header can never override them.
pub fn build_headers(
    hook: &Webhook,
    event: &str,
    timestamp: &DateTime,
    signature: Option<&str>,
) -> HashMap<String, String> {
    let mut headers = hook.headers.clone();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers.insert("X-Webhook-Event".to_string(), event.to_string());
    headers.insert("X-Webhook-ID".to_string(), hook.id.to_string());
    headers.insert("X-Webhook-Timestamp".to_string(), timestamp.to_rfc3339());
    if let Some(signature) = signature {
        headers.insert("X-Webhook-Signature".to_string(), signature.to_string());
    } else {
        headers.remove("X-Webhook-Signature");
    }
    headers
}

/// The transmitted request body
pub fn build_envelope(event: &str, payload: &Json, timestamp: &DateTime) -> Json {
    json!({
        "event": event,
        "data": payload,
        "timestamp": timestamp.to_rfc3339(),
    })
}

/// Runs one webhook delivery attempt.
///
/// Inactive endpoints and unsubscribed events are silent no-ops: no
/// request, no counters, no retry. Failed attempts bump `failed_calls`
/// every time; the auto-disable check runs only in the exhaustion hook.
pub struct WebhookDeliverer {
    store: Arc<dyn TaskStore>,
    webhooks: Arc<dyn WebhookStore>,
    transport: Arc<dyn WebhookTransport>,
}

impl WebhookDeliverer {
    /// Create a deliverer
    pub fn new(
        store: Arc<dyn TaskStore>,
        webhooks: Arc<dyn WebhookStore>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Self {
        Self {
            store,
            webhooks,
            transport,
        }
    }

    async fn persist_failure(&self, mut record: TaskRecord, error: &ExecutionError) {
        record.fail(error.to_string());
        if let Err(store_error) = self.store.update(record).await {
            warn!(error = %store_error, "failed to persist delivery failure");
        }
    }

    async fn count_failed_attempt(&self, hook: &Webhook) {
        if let Err(store_error) = self.webhooks.record_failure(&hook.id).await {
            warn!(error = %store_error, "failed to record delivery failure");
        }
    }
}

#[async_trait]
impl TaskExecutor for WebhookDeliverer {
    fn kind(&self) -> TaskKind {
        TaskKind::WebhookDelivery
    }

    async fn execute(&self, mut record: TaskRecord) -> TaskOutcome {
        let (webhook_id, event, payload) = match &record.details {
            TaskDetails::WebhookDelivery {
                webhook_id,
                event,
                payload,
            } => (webhook_id.clone(), event.clone(), payload.clone()),
            _ => {
                let error =
                    ExecutionError::configuration("webhook deliverer received a non-delivery task");
                self.persist_failure(record, &error).await;
                return TaskOutcome::Fatal(error);
            }
        };

        let hook = match self.webhooks.get(&webhook_id).await {
            Ok(Some(hook)) => hook,
            Ok(None) => {
                let error =
                    ExecutionError::configuration(format!("webhook {webhook_id} does not exist"));
                self.persist_failure(record, &error).await;
                return TaskOutcome::Fatal(error);
            }
            Err(store_error) => {
                let error = ExecutionError::from(store_error);
                self.persist_failure(record, &error).await;
                return TaskOutcome::Retryable(error);
            }
        };

        if !hook.is_active || !hook.subscribes_to(&event) {
            let mut output = JsonMap::new();
            output.insert("skipped".to_string(), Json::Bool(true));
            record.complete(output);
            if let Err(store_error) = self.store.update(record).await {
                warn!(error = %store_error, "failed to persist skipped delivery");
            }
            info!(webhook_id = %webhook_id, event = %event, "delivery skipped");
            return TaskOutcome::Skipped;
        }

        let timestamp = chrono::Utc::now();
        let signature = match hook.secret.as_deref() {
            Some(secret) => match compute_signature(secret, &payload) {
                Ok(signature) => Some(signature),
                Err(sign_error) => {
                    self.persist_failure(record, &sign_error).await;
                    return TaskOutcome::Fatal(sign_error);
                }
            },
            None => None,
        };
        let headers = build_headers(&hook, &event, &timestamp, signature.as_deref());
        let body = build_envelope(&event, &payload, &timestamp);

        match self.transport.post(&hook.url, &headers, &body).await {
            Ok(status) if (200..300).contains(&status) => {
                if let Err(store_error) = self.webhooks.record_success(&hook.id).await {
                    warn!(error = %store_error, "failed to record delivery success");
                }

                let mut output = JsonMap::new();
                output.insert("status".to_string(), Json::from(status));
                record.complete(output.clone());
                if let Err(store_error) = self.store.update(record).await {
                    warn!(error = %store_error, "failed to persist delivery success");
                }

                info!(webhook_id = %webhook_id, event = %event, status, "webhook delivered");
                TaskOutcome::Completed(output)
            }
            Ok(status) => {
                self.count_failed_attempt(&hook).await;
                let error = ExecutionError::http(status);
                self.persist_failure(record, &error).await;
                TaskOutcome::Retryable(error)
            }
            Err(transport_error) => {
                self.count_failed_attempt(&hook).await;
                self.persist_failure(record, &transport_error).await;
                TaskOutcome::Retryable(transport_error)
            }
        }
    }

    async fn on_exhausted(&self, record: &TaskRecord) -> Result<()> {
        let TaskDetails::WebhookDelivery { webhook_id, .. } = &record.details else {
            return Ok(());
        };

        error!(
            task_id = %record.id,
            webhook_id = %webhook_id,
            "webhook delivery failed permanently"
        );

        let Some(hook) = self.webhooks.get(webhook_id).await? else {
            return Ok(());
        };
        if hook.should_disable() {
            self.webhooks.deactivate(webhook_id).await?;
            warn!(
                webhook_id = %webhook_id,
                failed_calls = hook.failed_calls,
                "webhook auto-disabled; manual re-enable required"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use relay_core::{Id, TaskStatus};
    use relay_store::{InMemoryTaskStore, InMemoryWebhookStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    struct MockTransport {
        status: u16,
        calls: AtomicUsize,
        seen_headers: RwLock<Option<HashMap<String, String>>>,
        seen_body: RwLock<Option<Json>>,
    }

    impl MockTransport {
        fn with_status(status: u16) -> Self {
            Self {
                status,
                calls: AtomicUsize::new(0),
                seen_headers: RwLock::new(None),
                seen_body: RwLock::new(None),
            }
        }
    }

    #[async_trait]
    impl WebhookTransport for MockTransport {
        async fn post(
            &self,
            _url: &str,
            headers: &HashMap<String, String>,
            body: &Json,
        ) -> Result<u16> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_headers.write().await = Some(headers.clone());
            *self.seen_body.write().await = Some(body.clone());
            Ok(self.status)
        }
    }

    struct Harness {
        store: Arc<InMemoryTaskStore>,
        webhooks: Arc<InMemoryWebhookStore>,
        transport: Arc<MockTransport>,
        deliverer: WebhookDeliverer,
    }

    async fn harness(hook: Webhook, status: u16) -> Harness {
        let store = Arc::new(InMemoryTaskStore::new());
        let webhooks = Arc::new(InMemoryWebhookStore::new());
        webhooks.upsert(hook).await.unwrap();
        let transport = Arc::new(MockTransport::with_status(status));
        let deliverer = WebhookDeliverer::new(store.clone(), webhooks.clone(), transport.clone());
        Harness {
            store,
            webhooks,
            transport,
            deliverer,
        }
    }

    fn fixture_hook() -> Webhook {
        Webhook::new(
            Id::new("tenant_1"),
            "https://example.com/hook",
            vec!["agent.executed".to_string()],
        )
    }

    async fn claimed_delivery(
        store: &InMemoryTaskStore,
        hook: &Webhook,
        event: &str,
    ) -> TaskRecord {
        let record = TaskRecord::new(
            hook.tenant_id.clone(),
            JsonMap::new(),
            TaskDetails::webhook_delivery(hook.id.clone(), event, json!({"n": 1})),
        );
        store.insert(record.clone()).await.unwrap();
        store.claim(&record.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_successful_delivery() {
        let hook = fixture_hook();
        let harness = harness(hook.clone(), 200).await;
        let claimed = claimed_delivery(&harness.store, &hook, "agent.executed").await;

        let actual = harness.deliverer.execute(claimed.clone()).await;

        assert!(matches!(actual, TaskOutcome::Completed(_)));
        assert_eq!(harness.transport.calls.load(Ordering::SeqCst), 1);

        let stored_hook = harness.webhooks.get(&hook.id).await.unwrap().unwrap();
        assert_eq!(stored_hook.total_calls, 1);
        assert_eq!(stored_hook.failed_calls, 0);
        assert!(stored_hook.last_triggered_at.is_some());

        let stored = harness.store.get(&claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_inactive_endpoint_is_silent_noop() {
        let hook = fixture_hook().is_active(false);
        let harness = harness(hook.clone(), 200).await;
        let claimed = claimed_delivery(&harness.store, &hook, "agent.executed").await;

        let actual = harness.deliverer.execute(claimed).await;

        assert!(matches!(actual, TaskOutcome::Skipped));
        assert_eq!(harness.transport.calls.load(Ordering::SeqCst), 0);

        let stored_hook = harness.webhooks.get(&hook.id).await.unwrap().unwrap();
        assert_eq!(stored_hook.total_calls, 0);
        assert_eq!(stored_hook.failed_calls, 0);
    }

    #[tokio::test]
    async fn test_unsubscribed_event_is_silent_noop() {
        let hook = fixture_hook();
        let harness = harness(hook.clone(), 200).await;
        let claimed = claimed_delivery(&harness.store, &hook, "workflow.completed").await;

        let actual = harness.deliverer.execute(claimed).await;

        assert!(matches!(actual, TaskOutcome::Skipped));
        assert_eq!(harness.transport.calls.load(Ordering::SeqCst), 0);

        let stored_hook = harness.webhooks.get(&hook.id).await.unwrap().unwrap();
        assert_eq!(stored_hook.total_calls, 0);
        assert_eq!(stored_hook.failed_calls, 0);
    }

    #[tokio::test]
    async fn test_non_success_status_is_retryable_and_counted() {
        let hook = fixture_hook();
        let harness = harness(hook.clone(), 503).await;
        let claimed = claimed_delivery(&harness.store, &hook, "agent.executed").await;

        let actual = harness.deliverer.execute(claimed.clone()).await;

        assert!(matches!(
            actual,
            TaskOutcome::Retryable(ExecutionError::Http { status: 503 })
        ));

        let stored_hook = harness.webhooks.get(&hook.id).await.unwrap().unwrap();
        assert_eq!(stored_hook.failed_calls, 1);
        assert_eq!(stored_hook.total_calls, 0);

        let stored = harness.store.get(&claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(stored.error_message.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_envelope_and_fixed_headers() {
        let mut hook = fixture_hook().secret("s3cr3t");
        hook.headers
            .insert("X-Webhook-Event".to_string(), "spoofed".to_string());
        hook.headers
            .insert("X-Team".to_string(), "billing".to_string());

        let harness = harness(hook.clone(), 200).await;
        let claimed = claimed_delivery(&harness.store, &hook, "agent.executed").await;

        harness.deliverer.execute(claimed).await;

        let headers = harness.transport.seen_headers.read().await.clone().unwrap();
        // Fixed headers win over custom ones; unrelated custom headers pass
        assert_eq!(headers["X-Webhook-Event"], "agent.executed");
        assert_eq!(headers["X-Team"], "billing");
        assert_eq!(headers["Content-Type"], "application/json");
        assert_eq!(headers["X-Webhook-ID"], hook.id.to_string());
        assert!(headers.contains_key("X-Webhook-Timestamp"));

        let body = harness.transport.seen_body.read().await.clone().unwrap();
        assert_eq!(body["event"], "agent.executed");
        assert_eq!(body["data"], json!({"n": 1}));
        assert!(body["timestamp"].as_str().unwrap().contains('T'));

        // The signature covers the payload alone, not the envelope body
        let expected = compute_signature("s3cr3t", &json!({"n": 1})).unwrap();
        assert_eq!(headers["X-Webhook-Signature"], expected);
    }

    #[tokio::test]
    async fn test_no_signature_without_secret() {
        let hook = fixture_hook();
        let harness = harness(hook.clone(), 200).await;
        let claimed = claimed_delivery(&harness.store, &hook, "agent.executed").await;

        harness.deliverer.execute(claimed).await;

        let headers = harness.transport.seen_headers.read().await.clone().unwrap();
        assert!(!headers.contains_key("X-Webhook-Signature"));
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_fatal() {
        let hook = fixture_hook();
        let harness = harness(hook.clone(), 200).await;

        let record = TaskRecord::new(
            Id::new("tenant_1"),
            JsonMap::new(),
            TaskDetails::webhook_delivery(Id::new("hook_missing"), "agent.executed", json!({})),
        );
        harness.store.insert(record.clone()).await.unwrap();
        let claimed = harness.store.claim(&record.id).await.unwrap();

        let actual = harness.deliverer.execute(claimed).await;

        assert!(matches!(actual, TaskOutcome::Fatal(_)));
    }

    #[tokio::test]
    async fn test_exhaustion_disables_at_threshold() {
        let hook = fixture_hook();
        let harness = harness(hook.clone(), 503).await;
        let claimed = claimed_delivery(&harness.store, &hook, "agent.executed").await;

        for _ in 0..10 {
            harness.webhooks.record_failure(&hook.id).await.unwrap();
        }

        harness.deliverer.on_exhausted(&claimed).await.unwrap();

        let stored_hook = harness.webhooks.get(&hook.id).await.unwrap().unwrap();
        assert!(!stored_hook.is_active);
    }

    #[tokio::test]
    async fn test_exhaustion_below_threshold_keeps_active() {
        let hook = fixture_hook();
        let harness = harness(hook.clone(), 503).await;
        let claimed = claimed_delivery(&harness.store, &hook, "agent.executed").await;

        for _ in 0..9 {
            harness.webhooks.record_failure(&hook.id).await.unwrap();
        }

        harness.deliverer.on_exhausted(&claimed).await.unwrap();

        let stored_hook = harness.webhooks.get(&hook.id).await.unwrap().unwrap();
        assert!(stored_hook.is_active);
    }

    #[test]
    fn test_signature_is_deterministic_hex() {
        let payload = json!({"a": 1, "b": "two"});

        let first = compute_signature("secret", &payload).unwrap();
        let second = compute_signature("secret", &payload).unwrap();
        let other_secret = compute_signature("different", &payload).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(first != other_secret);
    }
}
