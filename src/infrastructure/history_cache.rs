// In-memory TTL cache for chart series
use crate::application::history_service::HistoryCache;
use crate::domain::telemetry::TimeSeriesPoint;
use crate::infrastructure::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct Entry {
    stored_at: Instant,
    points: Vec<TimeSeriesPoint>,
}

pub struct MemoryHistoryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for MemoryHistoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl MemoryHistoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl HistoryCache for MemoryHistoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<TimeSeriesPoint>>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Ok(Some(entry.points.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, points: &[TimeSeriesPoint]) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        entries.insert(
            key.to_string(),
            Entry {
                stored_at: Instant::now(),
                points: points.to_vec(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = MemoryHistoryCache::default();
        let points = vec![TimeSeriesPoint::new(1_000, 71.5)];

        cache.put("motor1:temperature:24h:100", &points).unwrap();
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(cache.get("motor1:temperature:24h:100").unwrap(), Some(points));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cache.get("motor1:temperature:24h:100").unwrap(), None);
        assert!(cache.entries.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_evicts_stale_entries() {
        let cache = MemoryHistoryCache::new(Duration::from_secs(10));
        cache.put("a", &[]).unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        cache.put("b", &[]).unwrap();

        assert_eq!(cache.entries.lock().len(), 1);
    }
}
