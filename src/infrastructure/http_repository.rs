// HTTP repository implementation for the plant telemetry API
use crate::application::telemetry_repository::TelemetryRepository;
use crate::domain::telemetry::{HistoryQuery, TimeSeriesPoint};
use crate::infrastructure::error::{MonitorError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpTelemetryRepository {
    client: reqwest::Client,
    base_url: String,
    latest_path: String,
    history_path: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct HistoryRecord {
    #[serde(alias = "time")]
    timestamp: String,
    value: Option<f64>,
}

impl HttpTelemetryRepository {
    pub fn new(
        base_url: &str,
        latest_path: &str,
        history_path: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            latest_path: latest_path.to_string(),
            history_path: history_path.to_string(),
            timeout,
        })
    }

    fn build_history_url(&self, query: &HistoryQuery) -> String {
        format!(
            "{}{}?variable={}&motor={}&range={}&limit={}",
            self.base_url,
            self.history_path,
            urlencoding::encode(&query.variable),
            urlencoding::encode(&query.motor),
            urlencoding::encode(&query.range),
            query.limit
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, token: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MonitorError::Timeout(self.timeout)
                } else {
                    MonitorError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl TelemetryRepository for HttpTelemetryRepository {
    async fn fetch_latest(&self, token: &str) -> Result<Map<String, Value>> {
        let url = format!("{}{}", self.base_url, self.latest_path);
        self.get_json(&url, token).await
    }

    async fn fetch_history(&self, token: &str, query: &HistoryQuery) -> Result<Vec<TimeSeriesPoint>> {
        let url = self.build_history_url(query);
        tracing::debug!("Fetching history: {}", url);

        let records: Vec<HistoryRecord> = self.get_json(&url, token).await?;

        // Rows without a value or with an unparseable time are gaps, not errors
        let points = records
            .into_iter()
            .filter_map(|r| {
                let value = r.value?;
                let time = chrono::DateTime::parse_from_rfc3339(&r.timestamp).ok()?;
                Some(TimeSeriesPoint::new(time.timestamp_millis(), value))
            })
            .collect();

        Ok(points)
    }
}
