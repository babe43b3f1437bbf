// Telemetry data domain models
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

/// Parameters of a historical series request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryQuery {
    pub variable: String,
    pub motor: String,
    pub range: String,
    pub limit: usize,
}

impl HistoryQuery {
    pub fn cache_key(&self) -> String {
        format!("{}:{}:{}:{}", self.motor, self.variable, self.range, self.limit)
    }
}

/// Downsample time series points using bucket averaging
pub fn downsample_points(points: Vec<TimeSeriesPoint>, max_points: usize) -> Vec<TimeSeriesPoint> {
    if points.is_empty() || max_points == 0 || points.len() <= max_points {
        return points;
    }

    let bucket_size = (points.len() as f64 / max_points as f64).ceil() as usize;
    let mut downsampled = Vec::with_capacity(max_points);

    for bucket in points.chunks(bucket_size) {
        // Middle point's timestamp, average value
        let mid_idx = bucket.len() / 2;
        let avg_value = bucket.iter().map(|p| p.value).sum::<f64>() / bucket.len() as f64;

        downsampled.push(TimeSeriesPoint::new(bucket[mid_idx].time_ms, avg_value));
    }

    downsampled
}
