// Monitor driver - runs mode selector effects and owns the connection timers

use crate::application::connection_mode::{ModeEffect, ModeSignal, transition};
use crate::application::event_bus::{EventBus, EventKind, MonitorEvent, Subscription};
use crate::application::polling::PollingLoop;
use crate::application::push_transport::PushTransport;
use crate::application::simulation::simulated_readings;
use crate::application::state_store::StateStore;
use crate::domain::connection::ConnectionMode;
use crate::infrastructure::config::{PollingSettings, ThresholdsConfig};
use crate::infrastructure::error::MonitorError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Default)]
struct Timers {
    background: Vec<JoinHandle<()>>,
    recovery: Option<JoinHandle<()>>,
    simulation: Option<JoinHandle<()>>,
}

impl Timers {
    fn abort_all(&mut self) {
        for task in self.background.drain(..) {
            task.abort();
        }
        if let Some(task) = self.recovery.take() {
            task.abort();
        }
        if let Some(task) = self.simulation.take() {
            task.abort();
        }
    }
}

pub struct Monitor {
    store: Arc<StateStore>,
    bus: EventBus,
    polling: Arc<PollingLoop>,
    /// `None` runs in polling-only mode
    push: Option<PushTransport>,
    thresholds: ThresholdsConfig,
    settings: PollingSettings,
    signals: mpsc::UnboundedSender<ModeSignal>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ModeSignal>>>,
    timers: Mutex<Timers>,
    started_at: Instant,
    _subscriptions: Vec<Subscription>,
}

impl Monitor {
    pub fn new(
        store: Arc<StateStore>,
        bus: EventBus,
        polling: Arc<PollingLoop>,
        push: Option<PushTransport>,
        thresholds: ThresholdsConfig,
        settings: PollingSettings,
    ) -> Arc<Self> {
        let (signals, receiver) = mpsc::unbounded_channel();

        let routes = [
            (EventKind::PushConnected, ModeSignal::PushConnected),
            (EventKind::PushDisconnected, ModeSignal::PushDisconnected),
            (EventKind::PushExhausted, ModeSignal::Exhausted),
            (EventKind::PollingExhausted, ModeSignal::Exhausted),
        ];
        let subscriptions = routes
            .into_iter()
            .map(|(kind, signal)| {
                let signals = signals.clone();
                bus.subscribe(kind, move |_| {
                    let _ = signals.send(signal);
                })
            })
            .collect();

        Arc::new(Self {
            store,
            bus,
            polling,
            push,
            thresholds,
            settings,
            signals,
            receiver: Mutex::new(Some(receiver)),
            timers: Mutex::new(Timers::default()),
            started_at: Instant::now(),
            _subscriptions: subscriptions,
        })
    }

    /// Start the timers and the push transport. Calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let Some(mut receiver) = self.receiver.lock().take() else {
            tracing::warn!("Monitor already started");
            return;
        };

        let this = self.clone();
        let signal_loop = tokio::spawn(async move {
            while let Some(signal) = receiver.recv().await {
                this.apply(signal);
            }
        });

        let polling = self.polling.spawn(self.settings.interval());
        let liveness = self.spawn_liveness();
        self.timers
            .lock()
            .background
            .extend([signal_loop, polling, liveness]);

        self.store.mark_activity();
        self.signal(ModeSignal::Start);

        match &self.push {
            Some(push) => match push.connect() {
                Ok(()) => {}
                Err(MonitorError::AlreadyConnected) => tracing::debug!("Push transport already running"),
                Err(e) => {
                    tracing::warn!("Push transport failed to start: {}", e);
                    self.signal(ModeSignal::PushDisconnected);
                }
            },
            None => {
                tracing::info!("Push transport disabled, starting in polling mode");
                self.signal(ModeSignal::PushDisconnected);
            }
        }
    }

    pub fn stop(&self) {
        if let Some(push) = &self.push {
            push.disconnect();
        }
        self.timers.lock().abort_all();
        tracing::info!("Monitor stopped");
    }

    pub fn push(&self) -> Option<&PushTransport> {
        self.push.as_ref()
    }

    pub fn polling(&self) -> &Arc<PollingLoop> {
        &self.polling
    }

    fn signal(&self, signal: ModeSignal) {
        let _ = self.signals.send(signal);
    }

    fn apply(self: &Arc<Self>, signal: ModeSignal) {
        let current = self.store.mode();
        let step = transition(current, signal);

        if step.changes_mode(current) {
            self.store.set_mode(step.next);
            tracing::info!("Connection mode {} -> {} ({:?})", current, step.next, signal);
            self.bus.publish(MonitorEvent::ModeChanged {
                from: current,
                to: step.next,
            });
        }

        if step.next != ConnectionMode::Offline {
            if let Some(task) = self.timers.lock().simulation.take() {
                task.abort();
            }
        }

        for effect in step.effects {
            self.execute(effect);
        }
    }

    fn execute(self: &Arc<Self>, effect: ModeEffect) {
        match effect {
            ModeEffect::ResetErrors => self.store.reset_errors(),
            ModeEffect::PollNow => {
                self.polling.request_poll();
            }
            ModeEffect::GenerateSimulated => {
                let task = self.spawn_simulation();
                if let Some(old) = self.timers.lock().simulation.replace(task) {
                    old.abort();
                }
            }
            ModeEffect::ScheduleRecovery => {
                let delay = self.settings.recovery_delay();
                let signals = self.signals.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = signals.send(ModeSignal::RecoveryElapsed);
                });
                tracing::info!("Offline, retrying live data in {:?}", delay);
                if let Some(old) = self.timers.lock().recovery.replace(task) {
                    old.abort();
                }
            }
        }
    }

    /// Refresh simulated readings every polling period while offline.
    fn spawn_simulation(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.settings.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if this.store.mode() != ConnectionMode::Offline {
                    break;
                }
                let elapsed = this.started_at.elapsed().as_secs_f64();
                let readings = simulated_readings(&this.thresholds, elapsed);
                this.store.merge_motors(&readings, true);
                this.bus.publish(MonitorEvent::MotorsUpdated {
                    motors: readings.iter().map(|(m, _)| *m).collect(),
                    simulated: true,
                });
            }
        })
    }

    fn spawn_liveness(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let signals = self.signals.clone();
        let period = self.settings.liveness_check();
        let window = self.settings.liveness_timeout();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if store.mode() != ConnectionMode::Push {
                    continue;
                }
                let stale = store
                    .last_activity()
                    .is_none_or(|at| at.elapsed() >= window);
                if stale {
                    tracing::warn!("No push data for {:?}, falling back to polling", window);
                    let _ = signals.send(ModeSignal::LivenessExpired);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::alert_evaluator::AlertEvaluator;
    use crate::application::backoff::ReconnectPolicy;
    use crate::application::push_transport::{InboundFrame, PushChannel, PushConnector};
    use crate::application::telemetry_repository::TelemetryRepository;
    use crate::domain::motor::MotorId;
    use crate::domain::telemetry::{HistoryQuery, TimeSeriesPoint};
    use crate::infrastructure::config::MotorsConfig;
    use crate::infrastructure::credentials::Credentials;
    use crate::infrastructure::error::Result;
    use async_trait::async_trait;
    use serde_json::{Map, Value, json};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails while `down` is set, otherwise returns one motor1 reading.
    struct SwitchableRepository {
        down: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TelemetryRepository for SwitchableRepository {
        async fn fetch_latest(&self, _token: &str) -> Result<Map<String, Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(MonitorError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            match json!({"temperature_m1": 72.5, "status_m1": "normal"}) {
                Value::Object(map) => Ok(map),
                _ => Ok(Map::new()),
            }
        }

        async fn fetch_history(&self, _token: &str, _query: &HistoryQuery) -> Result<Vec<TimeSeriesPoint>> {
            Ok(Vec::new())
        }
    }

    /// Accepts connections that never deliver data.
    #[derive(Default)]
    struct SilentConnector {
        held: parking_lot::Mutex<Vec<tokio::sync::mpsc::Sender<InboundFrame>>>,
    }

    #[async_trait]
    impl PushConnector for SilentConnector {
        async fn open(&self) -> Result<PushChannel> {
            let (out_tx, _out_rx) = mpsc::channel(8);
            let (in_tx, in_rx) = mpsc::channel(8);
            self.held.lock().push(in_tx);
            Ok(PushChannel {
                outbound: out_tx,
                inbound: in_rx,
            })
        }
    }

    /// Refuses every connection attempt.
    #[derive(Default)]
    struct RefusingConnector {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl PushConnector for RefusingConnector {
        async fn open(&self) -> Result<PushChannel> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(MonitorError::Transport("connection refused".to_string()))
        }
    }

    struct Fixture {
        monitor: Arc<Monitor>,
        store: Arc<StateStore>,
        bus: EventBus,
        repository: Arc<SwitchableRepository>,
        modes: Arc<Mutex<Vec<ConnectionMode>>>,
        _sub: Subscription,
    }

    fn fixture(api_down: bool, push: Option<Arc<dyn PushConnector>>) -> Fixture {
        fixture_with_policy(api_down, push, ReconnectPolicy::default())
    }

    fn fixture_with_policy(
        api_down: bool,
        push: Option<Arc<dyn PushConnector>>,
        policy: ReconnectPolicy,
    ) -> Fixture {
        let store = Arc::new(StateStore::new());
        let bus = EventBus::new();
        let evaluator = Arc::new(AlertEvaluator::new(ThresholdsConfig::default(), 100, bus.clone()));
        let repository = Arc::new(SwitchableRepository {
            down: AtomicBool::new(api_down),
            calls: AtomicUsize::new(0),
        });
        let polling = Arc::new(PollingLoop::new(
            repository.clone(),
            Credentials::new(Some("secret".to_string())),
            store.clone(),
            evaluator.clone(),
            bus.clone(),
            MotorsConfig::default(),
            Duration::from_secs(10),
            3,
        ));
        let push = push.map(|connector| {
            PushTransport::new(
                connector,
                policy,
                store.clone(),
                evaluator,
                bus.clone(),
            )
        });

        let modes = Arc::new(Mutex::new(Vec::new()));
        let m = modes.clone();
        let sub = bus.subscribe(EventKind::ModeChanged, move |event| {
            if let MonitorEvent::ModeChanged { to, .. } = event {
                m.lock().push(*to);
            }
        });

        let monitor = Monitor::new(
            store.clone(),
            bus.clone(),
            polling,
            push,
            ThresholdsConfig::default(),
            PollingSettings::default(),
        );

        Fixture {
            monitor,
            store,
            bus,
            repository,
            modes,
            _sub: sub,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_only_start_polls_immediately() {
        let f = fixture(false, None);
        f.monitor.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(f.store.mode(), ConnectionMode::Polling);
        assert_eq!(*f.modes.lock(), vec![ConnectionMode::Push, ConnectionMode::Polling]);
        assert!(f.repository.calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(f.store.motor(MotorId::Motor1).temperature, 72.5);
        f.monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_go_offline_with_simulation_then_recover() {
        let f = fixture(true, None);
        f.monitor.start();

        // Immediate cycle plus two ticks at 5 s and 10 s
        tokio::time::sleep(Duration::from_millis(10_100)).await;
        assert_eq!(f.store.mode(), ConnectionMode::Offline);

        let motor = f.store.motor(MotorId::Motor2);
        assert!(motor.is_simulated);
        assert!(motor.temperature >= 20.0 && motor.temperature <= 95.0);

        f.repository.down.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(f.store.mode(), ConnectionMode::Polling);

        // Next polling tick after recovery replaces the simulated values
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(f.store.mode(), ConnectionMode::Polling);
        assert_eq!(f.store.connection().consecutive_errors, 0);
        assert!(!f.store.motor(MotorId::Motor1).is_simulated);
        f.monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_exhaustion_goes_offline_then_recovers() {
        let connector = Arc::new(RefusingConnector::default());
        let policy = ReconnectPolicy::new(Duration::from_millis(100), 1.5, 2);
        let f = fixture_with_policy(false, Some(connector.clone() as Arc<dyn PushConnector>), policy);
        f.monitor.start();

        // Refused open, retries after 100 ms and 150 ms, then exhausted
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(f.store.mode(), ConnectionMode::Offline);
        assert_eq!(
            *f.modes.lock(),
            vec![ConnectionMode::Push, ConnectionMode::Polling, ConnectionMode::Offline]
        );
        for motor in [MotorId::Motor1, MotorId::Motor2] {
            assert!(f.store.motor(motor).is_simulated);
        }

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(f.store.mode(), ConnectionMode::Offline);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.store.mode(), ConnectionMode::Polling);
        assert_eq!(f.store.connection().consecutive_errors, 0);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        f.monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_push_is_demoted_by_liveness_check() {
        let connector: Arc<dyn PushConnector> = Arc::new(SilentConnector::default());
        let f = fixture(false, Some(connector));
        f.monitor.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.store.mode(), ConnectionMode::Push);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(f.store.mode(), ConnectionMode::Push);

        // Window expires at 30 s, noticed by the 30 s check
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(f.store.mode(), ConnectionMode::Polling);
        f.monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_connect_resets_errors() {
        let f = fixture(true, None);
        f.monitor.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.store.connection().consecutive_errors, 1);

        f.bus.publish(MonitorEvent::PushConnected);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(f.store.mode(), ConnectionMode::Push);
        assert_eq!(f.store.connection().consecutive_errors, 0);
        f.monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_ignored() {
        let f = fixture(false, None);
        f.monitor.start();
        f.monitor.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(f.timer_count(), 3);
        f.monitor.stop();
    }

    impl Fixture {
        fn timer_count(&self) -> usize {
            self.monitor.timers.lock().background.len()
        }
    }
}
