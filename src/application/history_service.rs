// Historical series for charts
use crate::application::telemetry_repository::TelemetryRepository;
use crate::domain::telemetry::{HistoryQuery, TimeSeriesPoint, downsample_points};
use crate::infrastructure::credentials::Credentials;
use crate::infrastructure::error::Result;
use std::sync::Arc;

/// Series cache. Failures only cost a hit, callers never propagate them.
pub trait HistoryCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<TimeSeriesPoint>>>;
    fn put(&self, key: &str, points: &[TimeSeriesPoint]) -> Result<()>;
}

#[derive(Clone)]
pub struct HistoryService {
    repository: Arc<dyn TelemetryRepository>,
    credentials: Credentials,
    cache: Option<Arc<dyn HistoryCache>>,
    max_points: usize,
}

impl HistoryService {
    pub fn new(
        repository: Arc<dyn TelemetryRepository>,
        credentials: Credentials,
        cache: Option<Arc<dyn HistoryCache>>,
        max_points: usize,
    ) -> Self {
        Self {
            repository,
            credentials,
            cache,
            max_points,
        }
    }

    /// Chronological series for one motor variable.
    pub async fn history(&self, query: &HistoryQuery) -> Result<Vec<TimeSeriesPoint>> {
        let token = self.credentials.bearer_token()?;
        let key = query.cache_key();

        if let Some(cache) = &self.cache {
            match cache.get(&key) {
                Ok(Some(points)) => {
                    tracing::debug!("History cache hit for {}", key);
                    return Ok(points);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("History cache read failed for {}: {}", key, e),
            }
        }

        let mut points = self.repository.fetch_history(&token, query).await?;
        points.reverse();
        let points = downsample_points(points, self.max_points);

        tracing::info!("Fetched {} history points for {}", points.len(), key);

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&key, &points) {
                tracing::warn!("History cache write failed for {}: {}", key, e);
            }
        }

        Ok(points)
    }
}
