//! Delivery of setting records to the spreadsheet web app.
//!
//! Records are posted in fixed size chunks. Each chunk is retried on its own
//! with exponential backoff; a chunk that ultimately fails does not stop the
//! ones after it.

use crate::config::{MAX_ATTEMPTS_LIMIT, SheetConfig};
use crate::metrics_defs::{CHUNKS_DELIVERED, CHUNKS_FAILED};
use crate::settings::SettingRecord;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use shared::counter;
use storefront::types::ThemeCandidate;
use tokio::time::{Duration, sleep};
use url::Url;

const ACTION: &str = "webhook_theme_update";

const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
    StatusCode::TOO_MANY_REQUESTS,     // 429
    StatusCode::INTERNAL_SERVER_ERROR, // 500
    StatusCode::BAD_GATEWAY,           // 502
    StatusCode::SERVICE_UNAVAILABLE,   // 503
    StatusCode::GATEWAY_TIMEOUT,       // 504
];

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("sheet responded with status {0}")]
    Status(StatusCode),
    #[error("sheet rejected the chunk: {0}")]
    Rejected(String),
    #[error("gave up after {0} attempts")]
    RetriesExceeded(u32),
}

impl SinkError {
    fn is_retriable(&self) -> bool {
        match self {
            SinkError::ReqwestError(_) => true,
            SinkError::Status(status) => RETRIABLE_STATUS_CODES.contains(status),
            SinkError::Rejected(_) | SinkError::RetriesExceeded(_) => false,
        }
    }
}

/// Outcome of delivering one batch of records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub chunks: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn deliver(
        &self,
        store_name: &str,
        theme: &ThemeCandidate,
        records: &[SettingRecord],
    ) -> DeliveryReport;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkPayload<'a> {
    action: &'static str,
    store_name: &'a str,
    theme: &'a ThemeCandidate,
    records: &'a [SettingRecord],
    chunk: ChunkPosition,
}

#[derive(Serialize)]
struct ChunkPosition {
    index: usize,
    total: usize,
}

/// Delay before the next attempt after `retries` failed ones: the base delay
/// doubled per retry, saturating instead of overflowing.
fn backoff(base_delay_ms: u64, retries: u32) -> Duration {
    let factor = 2_u64.saturating_pow(retries.saturating_sub(1));
    Duration::from_millis(base_delay_ms.saturating_mul(factor))
}

pub struct SheetSink {
    client: reqwest::Client,
    url: Url,
    batch_size: usize,
    max_attempts: u32,
    base_delay: u64,
}

impl SheetSink {
    pub fn new(config: &SheetConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(SheetSink {
            client,
            url: config.url.clone(),
            batch_size: config.batch_size.max(1),
            max_attempts: config.max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT),
            base_delay: config.base_delay_ms,
        })
    }

    async fn send_with_retries(&self, payload: &ChunkPayload<'_>) -> Result<(), SinkError> {
        let mut retries = 0;

        loop {
            match self.send(payload).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retriable() => {
                    retries += 1;
                    if retries >= self.max_attempts {
                        tracing::warn!(error = %e, "Last delivery attempt failed");
                        return Err(SinkError::RetriesExceeded(retries));
                    }

                    let delay = backoff(self.base_delay, retries);
                    tracing::debug!(
                        error = %e,
                        attempt = retries,
                        retry_millis = delay.as_millis() as u64,
                        "Retrying chunk delivery"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(&self, payload: &ChunkPayload<'_>) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status));
        }

        // The web app reports its own failures inside a 200 response
        let body = response.text().await?;
        if let Ok(serde_json::Value::Object(reply)) = serde_json::from_str::<serde_json::Value>(&body)
            && let Some(error) = reply.get("error").filter(|error| !error.is_null())
        {
            let message = match error {
                serde_json::Value::String(message) => message.clone(),
                other => other.to_string(),
            };
            return Err(SinkError::Rejected(message));
        }

        Ok(())
    }
}

#[async_trait]
impl RecordSink for SheetSink {
    async fn deliver(
        &self,
        store_name: &str,
        theme: &ThemeCandidate,
        records: &[SettingRecord],
    ) -> DeliveryReport {
        let total = records.len().div_ceil(self.batch_size);
        let mut report = DeliveryReport {
            chunks: total,
            ..Default::default()
        };

        for (index, chunk) in records.chunks(self.batch_size).enumerate() {
            let payload = ChunkPayload {
                action: ACTION,
                store_name,
                theme,
                records: chunk,
                chunk: ChunkPosition { index, total },
            };

            match self.send_with_retries(&payload).await {
                Ok(()) => {
                    report.delivered += 1;
                    counter!(CHUNKS_DELIVERED).increment(1);
                }
                Err(e) => {
                    tracing::error!(
                        store = store_name,
                        chunk = index,
                        total,
                        records = chunk.len(),
                        error = %e,
                        "Failed to deliver chunk"
                    );
                    report.failed += 1;
                    counter!(CHUNKS_FAILED).increment(1);
                }
            }
        }

        tracing::info!(
            store = store_name,
            theme = %theme,
            chunks = report.chunks,
            delivered = report.delivered,
            failed = report.failed,
            "Delivered records"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn records(n: usize) -> Vec<SettingRecord> {
        (0..n)
            .map(|i| SettingRecord {
                file: "templates/index.json".into(),
                section: "main".into(),
                block: String::new(),
                setting: format!("setting_{i}"),
                value: json!(i),
            })
            .collect()
    }

    fn theme() -> ThemeCandidate {
        ThemeCandidate::new("gid://shopify/OnlineStoreTheme/7", "tt-ca/US_Live", "UNPUBLISHED")
    }

    fn sink(server: &MockServer, batch_size: usize, max_attempts: u32) -> SheetSink {
        let config = SheetConfig {
            url: Url::parse(&format!("{}/exec", server.uri())).unwrap(),
            batch_size,
            max_attempts,
            base_delay_ms: 1,
            timeout_secs: 5,
        };
        SheetSink::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_chunked_delivery() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/exec"))
            .and(body_partial_json(json!({
                "action": "webhook_theme_update",
                "storeName": "US_Live",
                "theme": {"id": "gid://shopify/OnlineStoreTheme/7", "role": "UNPUBLISHED"},
                "chunk": {"total": 3}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(3)
            .mount(&mock_server)
            .await;

        let report = sink(&mock_server, 2, 3)
            .deliver("US_Live", &theme(), &records(5))
            .await;
        assert_eq!(
            report,
            DeliveryReport {
                chunks: 3,
                delivered: 3,
                failed: 0
            }
        );

        let requests = mock_server.received_requests().await.unwrap();
        let last: serde_json::Value = serde_json::from_slice(&requests[2].body).unwrap();
        assert_eq!(last["chunk"], json!({"index": 2, "total": 3}));
        assert_eq!(last["records"].as_array().unwrap().len(), 1);
        assert_eq!(last["records"][0]["settingName"], "setting_4");
    }

    #[tokio::test]
    async fn test_retries_transient_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let report = sink(&mock_server, 50, 3)
            .deliver("US_Live", &theme(), &records(3))
            .await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(6)
            .mount(&mock_server)
            .await;

        // Both chunks exhaust their attempts independently
        let report = sink(&mock_server, 2, 3)
            .deliver("US_Live", &theme(), &records(4))
            .await;
        assert_eq!(
            report,
            DeliveryReport {
                chunks: 2,
                delivered: 0,
                failed: 2
            }
        );
    }

    #[tokio::test]
    async fn test_permanent_failure_only_drops_its_chunk() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({"chunk": {"index": 0}})))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"chunk": {"index": 1}})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let report = sink(&mock_server, 1, 3)
            .deliver("US_Live", &theme(), &records(2))
            .await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_error_reply_is_a_rejection() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "Sheet not found"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let report = sink(&mock_server, 50, 3)
            .deliver("US_Live", &theme(), &records(1))
            .await;
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_null_error_is_not_a_rejection() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "error": null})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let report = sink(&mock_server, 50, 3)
            .deliver("US_Live", &theme(), &records(1))
            .await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_retries_transport_errors() {
        // Bind and drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = SheetConfig {
            url: Url::parse(&format!("http://{addr}/exec")).unwrap(),
            batch_size: 50,
            max_attempts: 3,
            base_delay_ms: 1,
            timeout_secs: 5,
        };
        let sink = SheetSink::new(&config).unwrap();

        let theme = theme();
        let records = records(2);
        let payload = ChunkPayload {
            action: ACTION,
            store_name: "US_Live",
            theme: &theme,
            records: &records,
            chunk: ChunkPosition { index: 0, total: 1 },
        };
        assert!(matches!(
            sink.send_with_retries(&payload).await,
            Err(SinkError::RetriesExceeded(3))
        ));

        let report = sink.deliver("US_Live", &theme, &records).await;
        assert_eq!(
            report,
            DeliveryReport {
                chunks: 1,
                delivered: 0,
                failed: 1
            }
        );
    }

    #[test]
    fn test_backoff_doubles_per_retry() {
        assert_eq!(backoff(1000, 1), Duration::from_millis(1000));
        assert_eq!(backoff(1000, 2), Duration::from_millis(2000));
        assert_eq!(backoff(1000, 3), Duration::from_millis(4000));
        assert_eq!(backoff(250, 5), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(backoff(u64::MAX, 2), Duration::from_millis(u64::MAX));
        assert_eq!(backoff(1000, u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_max_attempts_is_clamped() {
        let config = SheetConfig {
            url: Url::parse("http://127.0.0.1:9/exec").unwrap(),
            batch_size: 50,
            max_attempts: u32::MAX,
            base_delay_ms: 1,
            timeout_secs: 5,
        };
        assert_eq!(SheetSink::new(&config).unwrap().max_attempts, MAX_ATTEMPTS_LIMIT);
    }

    #[tokio::test]
    async fn test_nothing_to_deliver() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let report = sink(&mock_server, 50, 3)
            .deliver("US_Live", &theme(), &[])
            .await;
        assert_eq!(report, DeliveryReport::default());
    }
}
