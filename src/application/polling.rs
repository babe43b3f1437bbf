// Polling fallback loop - fixed-period snapshot fetches while in polling mode

use crate::application::alert_evaluator::AlertEvaluator;
use crate::application::event_bus::{EventBus, MonitorEvent};
use crate::application::state_store::StateStore;
use crate::application::telemetry_repository::TelemetryRepository;
use crate::domain::connection::ConnectionMode;
use crate::domain::motor::{MotorFields, MotorId, MotorStatus, Variable};
use crate::infrastructure::config::MotorsConfig;
use crate::infrastructure::credentials::Credentials;
use crate::infrastructure::error::{MonitorError, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingMetrics {
    pub attempts: u64,
    pub successes: u64,
    pub errors: u64,
    pub last_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Not in polling mode, or a cycle is already in flight
    Skipped,
    Succeeded,
    Failed { consecutive_errors: u32, exhausted: bool },
}

/// Clears the in-flight flag even if the cycle future is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PollingLoop {
    repository: Arc<dyn TelemetryRepository>,
    credentials: Credentials,
    store: Arc<StateStore>,
    evaluator: Arc<AlertEvaluator>,
    bus: EventBus,
    motors: MotorsConfig,
    request_timeout: Duration,
    failure_threshold: u32,
    in_flight: AtomicBool,
    poll_now: Notify,
    metrics: Mutex<PollingMetrics>,
}

impl PollingLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn TelemetryRepository>,
        credentials: Credentials,
        store: Arc<StateStore>,
        evaluator: Arc<AlertEvaluator>,
        bus: EventBus,
        motors: MotorsConfig,
        request_timeout: Duration,
        failure_threshold: u32,
    ) -> Self {
        Self {
            repository,
            credentials,
            store,
            evaluator,
            bus,
            motors,
            request_timeout,
            failure_threshold: failure_threshold.max(1),
            in_flight: AtomicBool::new(false),
            poll_now: Notify::new(),
            metrics: Mutex::new(PollingMetrics::default()),
        }
    }

    pub fn metrics(&self) -> PollingMetrics {
        self.metrics.lock().clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Ask the running loop for an immediate cycle. A cycle already in
    /// flight answers the request, so no permit is left behind for it.
    pub fn request_poll(&self) -> bool {
        if self.is_in_flight() {
            tracing::debug!("Poll requested while a cycle is in flight, ignoring");
            return false;
        }
        self.poll_now.notify_one();
        true
    }

    /// Run the ticker until the task is aborted.
    pub fn spawn(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = this.poll_now.notified() => {}
                }
                this.tick().await;
            }
        })
    }

    /// One timer tick: a cycle if polling is authoritative and none is running.
    pub async fn tick(&self) -> CycleOutcome {
        if self.store.mode() != ConnectionMode::Polling {
            return CycleOutcome::Skipped;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("Polling cycle already in flight, skipping tick");
            return CycleOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);

        self.run_cycle().await
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let started = Instant::now();
        self.metrics.lock().attempts += 1;

        let result = self.fetch_once().await;

        let elapsed = started.elapsed();
        {
            let mut metrics = self.metrics.lock();
            metrics.last_duration_ms = Some(elapsed.as_millis() as u64);
            match result {
                Ok(_) => metrics.successes += 1,
                Err(_) => metrics.errors += 1,
            }
        }

        match result {
            Ok(updates) => {
                for (motor, fields) in &updates {
                    self.evaluator.evaluate_fields(*motor, fields);
                }
                self.store.merge_motors(&updates, false);
                self.store.record_success(Utc::now());
                if !updates.is_empty() {
                    self.bus.publish(MonitorEvent::MotorsUpdated {
                        motors: updates.iter().map(|(m, _)| *m).collect(),
                        simulated: false,
                    });
                }
                tracing::debug!("Polling cycle succeeded in {:?}", elapsed);
                CycleOutcome::Succeeded
            }
            Err(e) => {
                let consecutive_errors = self.store.record_failure();
                let exhausted = consecutive_errors >= self.failure_threshold;
                tracing::warn!(
                    "Polling cycle failed ({} consecutive): {}",
                    consecutive_errors,
                    e
                );
                if exhausted {
                    tracing::warn!("Polling exhausted after {} failures", consecutive_errors);
                    self.bus.publish(MonitorEvent::PollingExhausted);
                }
                CycleOutcome::Failed {
                    consecutive_errors,
                    exhausted,
                }
            }
        }
    }

    async fn fetch_once(&self) -> Result<Vec<(MotorId, MotorFields)>> {
        let token = self.credentials.bearer_token()?;

        let snapshot = tokio::time::timeout(self.request_timeout, self.repository.fetch_latest(&token))
            .await
            .map_err(|_| MonitorError::Timeout(self.request_timeout))??;

        Ok(parse_snapshot(&snapshot, &self.motors))
    }
}

/// Split a flat `<variable>_<suffix>` object into per-motor updates.
/// Unknown keys and unusable values are skipped.
pub fn parse_snapshot(snapshot: &Map<String, Value>, motors: &MotorsConfig) -> Vec<(MotorId, MotorFields)> {
    let mut grouped: BTreeMap<MotorId, MotorFields> = BTreeMap::new();

    for (key, value) in snapshot {
        let Some((name, suffix)) = key.rsplit_once('_') else {
            continue;
        };
        let Some(motor) = motors.by_suffix(suffix) else {
            continue;
        };

        if name == "status" {
            if let Ok(status) = serde_json::from_value::<MotorStatus>(value.clone()) {
                grouped.entry(motor).or_default().status = Some(status);
            }
            continue;
        }

        let Some(variable) = Variable::parse(name) else {
            continue;
        };
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|n| n.is_finite());
        if let Some(number) = number {
            grouped.entry(motor).or_default().set(variable, number);
        }
    }

    grouped
        .into_iter()
        .filter(|(_, fields)| !fields.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::event_bus::EventKind;
    use crate::domain::telemetry::{HistoryQuery, TimeSeriesPoint};
    use crate::infrastructure::config::ThresholdsConfig;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedRepository {
        responses: Mutex<VecDeque<Result<Map<String, Value>>>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedRepository {
        fn new(responses: Vec<Result<Map<String, Value>>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(vec![Ok(Map::new())])
            }
        }
    }

    #[async_trait]
    impl TelemetryRepository for ScriptedRepository {
        async fn fetch_latest(&self, _token: &str) -> Result<Map<String, Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(MonitorError::Transport("script exhausted".to_string())))
        }

        async fn fetch_history(&self, _token: &str, _query: &HistoryQuery) -> Result<Vec<TimeSeriesPoint>> {
            Ok(Vec::new())
        }
    }

    fn snapshot(json: &str) -> Map<String, Value> {
        serde_json::from_str(json).unwrap()
    }

    fn network_error() -> Result<Map<String, Value>> {
        Err(MonitorError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        })
    }

    struct Fixture {
        polling: Arc<PollingLoop>,
        store: Arc<StateStore>,
        bus: EventBus,
        repository: Arc<ScriptedRepository>,
    }

    fn fixture(repository: ScriptedRepository, token: Option<&str>) -> Fixture {
        let repository = Arc::new(repository);
        let store = Arc::new(StateStore::new());
        let bus = EventBus::new();
        let evaluator = Arc::new(AlertEvaluator::new(ThresholdsConfig::default(), 100, bus.clone()));
        let polling = Arc::new(PollingLoop::new(
            repository.clone(),
            Credentials::new(token.map(str::to_string)),
            store.clone(),
            evaluator,
            bus.clone(),
            MotorsConfig::default(),
            Duration::from_secs(10),
            3,
        ));
        store.set_mode(ConnectionMode::Polling);

        Fixture {
            polling,
            store,
            bus,
            repository,
        }
    }

    #[test]
    fn test_parse_snapshot() {
        let data = snapshot(
            r#"{"temperature_m1":72.5,"oil_pressure_m1":"3.9","clutch_pressure_m2":12,
                "status_m2":"warning","rpm_m1":1500,"temperature_m7":10,"timestamp":"x"}"#,
        );

        let updates = parse_snapshot(&data, &MotorsConfig::default());

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].0, MotorId::Motor1);
        assert_eq!(updates[0].1.temperature, Some(72.5));
        assert_eq!(updates[0].1.oil_pressure, Some(3.9));
        assert_eq!(updates[0].1.clutch_pressure, None);
        assert_eq!(updates[1].1.clutch_pressure, Some(12.0));
        assert_eq!(updates[1].1.status, Some(MotorStatus::Warning));
    }

    #[test]
    fn test_parse_snapshot_drops_non_finite_values() {
        let data = snapshot(
            r#"{"temperature_m1":"NaN","oil_pressure_m1":"inf","clutch_pressure_m1":"-infinity",
                "temperature_m2":"68.5"}"#,
        );

        let updates = parse_snapshot(&data, &MotorsConfig::default());

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, MotorId::Motor2);
        assert_eq!(updates[0].1.temperature, Some(68.5));
    }

    #[tokio::test]
    async fn test_non_finite_values_keep_open_alert() {
        let f = fixture(
            ScriptedRepository::new(vec![Ok(snapshot(r#"{"temperature_m1":"NaN","oil_pressure_m1":"inf"}"#))]),
            Some("t"),
        );
        let record = match f.polling.evaluator.evaluate(MotorId::Motor1, Variable::Temperature, 120.0) {
            crate::application::alert_evaluator::Evaluation::Raised(record) => record,
            other => panic!("expected a raised alert, got {:?}", other),
        };

        assert_eq!(f.polling.tick().await, CycleOutcome::Succeeded);

        let active = f.polling.evaluator.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, record.id);
        assert!(!active[0].resolved);
    }

    #[tokio::test]
    async fn test_tick_is_noop_outside_polling_mode() {
        let f = fixture(ScriptedRepository::new(vec![]), Some("t"));
        f.store.set_mode(ConnectionMode::Push);

        assert_eq!(f.polling.tick().await, CycleOutcome::Skipped);
        assert_eq!(f.repository.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.polling.metrics().attempts, 0);
    }

    #[tokio::test]
    async fn test_successful_cycle_merges_and_resets_errors() {
        let f = fixture(
            ScriptedRepository::new(vec![Ok(snapshot(r#"{"temperature_m1":71.0,"oil_pressure_m2":4.2}"#))]),
            Some("t"),
        );
        f.store.record_failure();

        assert_eq!(f.polling.tick().await, CycleOutcome::Succeeded);

        let state = f.store.snapshot();
        assert_eq!(state.connection.consecutive_errors, 0);
        assert!(state.connection.last_success.is_some());
        assert_eq!(state.motors[&MotorId::Motor1].temperature, 71.0);
        assert_eq!(state.motors[&MotorId::Motor2].oil_pressure, 4.2);
        assert!(!state.motors[&MotorId::Motor1].is_simulated);

        let metrics = f.polling.metrics();
        assert_eq!(metrics.attempts, 1);
        assert_eq!(metrics.successes, 1);
        assert_eq!(metrics.errors, 0);
        assert!(metrics.last_duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_three_failures_signal_exhaustion() {
        let f = fixture(
            ScriptedRepository::new(vec![network_error(), network_error(), network_error()]),
            Some("t"),
        );
        let exhausted = Arc::new(AtomicUsize::new(0));
        let e = exhausted.clone();
        let _sub = f.bus.subscribe(EventKind::PollingExhausted, move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(
            f.polling.tick().await,
            CycleOutcome::Failed { consecutive_errors: 1, exhausted: false }
        );
        assert_eq!(
            f.polling.tick().await,
            CycleOutcome::Failed { consecutive_errors: 2, exhausted: false }
        );
        assert_eq!(
            f.polling.tick().await,
            CycleOutcome::Failed { consecutive_errors: 3, exhausted: true }
        );

        assert_eq!(exhausted.load(Ordering::SeqCst), 1);
        assert_eq!(f.polling.metrics().errors, 3);
    }

    #[tokio::test]
    async fn test_missing_credential_fails_fast() {
        let f = fixture(ScriptedRepository::new(vec![Ok(Map::new())]), None);

        let outcome = f.polling.tick().await;

        assert!(matches!(outcome, CycleOutcome::Failed { consecutive_errors: 1, .. }));
        assert_eq!(f.repository.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        let f = fixture(ScriptedRepository::slow(Duration::from_secs(60)), Some("t"));

        let started = Instant::now();
        let outcome = f.polling.tick().await;

        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(11));
        assert!(!f.polling.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_ticks_are_single_flight() {
        let f = fixture(ScriptedRepository::slow(Duration::from_secs(2)), Some("t"));

        let (first, second) = tokio::join!(f.polling.tick(), f.polling.tick());

        assert_eq!(first, CycleOutcome::Succeeded);
        assert_eq!(second, CycleOutcome::Skipped);
        assert_eq!(f.repository.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_polls_on_period_and_on_request() {
        let responses = (0..10).map(|_| Ok(snapshot(r#"{"temperature_m1":70.0}"#))).collect();
        let f = fixture(ScriptedRepository::new(responses), Some("t"));

        let handle = f.polling.spawn(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.repository.calls.load(Ordering::SeqCst), 0);

        f.polling.request_poll();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.repository.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.repository.calls.load(Ordering::SeqCst), 2);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_request_during_cycle_is_not_queued() {
        let f = fixture(ScriptedRepository::slow(Duration::from_secs(2)), Some("t"));

        let handle = f.polling.spawn(Duration::from_secs(60));
        assert!(f.polling.request_poll());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(f.polling.is_in_flight());

        assert!(!f.polling.request_poll());
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(!f.polling.is_in_flight());
        assert_eq!(f.repository.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.polling.metrics().attempts, 1);

        handle.abort();
    }
}
