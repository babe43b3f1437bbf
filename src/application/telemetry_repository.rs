// Repository trait for plant telemetry access
use crate::domain::telemetry::{HistoryQuery, TimeSeriesPoint};
use crate::infrastructure::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Latest snapshot as a flat object keyed by `<variable>_<motorSuffix>`
    async fn fetch_latest(&self, token: &str) -> Result<Map<String, Value>>;

    /// Historical records for one motor variable, newest first
    async fn fetch_history(&self, token: &str, query: &HistoryQuery) -> Result<Vec<TimeSeriesPoint>>;
}
