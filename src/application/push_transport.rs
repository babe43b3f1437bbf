// Push transport wrapper - one duplex session with backoff reconnects

use crate::application::alert_evaluator::AlertEvaluator;
use crate::application::backoff::ReconnectPolicy;
use crate::application::event_bus::{EventBus, MonitorEvent};
use crate::application::state_store::StateStore;
use crate::domain::message::{InboundMessage, known_motors};
use crate::domain::motor::{MotorFields, MotorId};
use crate::infrastructure::error::{MonitorError, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Frame received from the remote side.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Text(String),
    Closed { code: Option<u16>, reason: String },
}

/// Frame sent to the remote side. `Close` uses the normal closure code.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// An open session: outbound sender plus inbound frame receiver.
pub struct PushChannel {
    pub outbound: mpsc::Sender<OutboundFrame>,
    pub inbound: mpsc::Receiver<InboundFrame>,
}

#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn open(&self) -> Result<PushChannel>;
}

struct TransportState {
    policy: ReconnectPolicy,
    manual_close: bool,
    connected: bool,
    /// One `PushDisconnected` per outage
    down_announced: bool,
    outbound: Option<mpsc::Sender<OutboundFrame>>,
    session: Option<JoinHandle<()>>,
}

struct Inner {
    connector: Arc<dyn PushConnector>,
    store: Arc<StateStore>,
    evaluator: Arc<AlertEvaluator>,
    bus: EventBus,
    state: Mutex<TransportState>,
}

#[derive(Clone)]
pub struct PushTransport {
    inner: Arc<Inner>,
}

impl PushTransport {
    pub fn new(
        connector: Arc<dyn PushConnector>,
        policy: ReconnectPolicy,
        store: Arc<StateStore>,
        evaluator: Arc<AlertEvaluator>,
        bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                store,
                evaluator,
                bus,
                state: Mutex::new(TransportState {
                    policy,
                    manual_close: false,
                    connected: false,
                    down_announced: false,
                    outbound: None,
                    session: None,
                }),
            }),
        }
    }

    /// Start a session. Refused while one is already open or reconnecting.
    pub fn connect(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.session.as_ref().is_some_and(|s| !s.is_finished()) {
            return Err(MonitorError::AlreadyConnected);
        }

        state.manual_close = false;
        state.down_announced = false;
        state.policy.reset();
        state.session = Some(tokio::spawn(run_session(self.inner.clone())));
        Ok(())
    }

    /// Close on purpose: no reconnects, pending retry timers are cancelled.
    pub fn disconnect(&self) {
        let mut state = self.inner.state.lock();
        state.manual_close = true;
        state.connected = false;

        if let Some(outbound) = state.outbound.take() {
            if outbound.try_send(OutboundFrame::Close).is_err() {
                tracing::debug!("Push outbound queue closed before close frame");
            }
        }
        if let Some(session) = state.session.take() {
            session.abort();
        }
        tracing::info!("Push transport disconnected manually");
    }

    /// Send a JSON value verbatim over the open session.
    pub async fn send(&self, payload: &serde_json::Value) -> Result<()> {
        let outbound = {
            let state = self.inner.state.lock();
            match (&state.outbound, state.connected) {
                (Some(outbound), true) => outbound.clone(),
                _ => return Err(MonitorError::NotConnected),
            }
        };

        let text = serde_json::to_string(payload)?;
        outbound
            .send(OutboundFrame::Text(text))
            .await
            .map_err(|_| MonitorError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    pub fn retry_attempt(&self) -> u32 {
        self.inner.state.lock().policy.attempt()
    }
}

async fn run_session(inner: Arc<Inner>) {
    loop {
        match inner.connector.open().await {
            Ok(channel) => {
                let mut inbound = channel.inbound;
                if !inner.on_open(channel.outbound) {
                    return;
                }

                while let Some(frame) = inbound.recv().await {
                    match frame {
                        InboundFrame::Text(text) => inner.handle_text(&text),
                        InboundFrame::Closed { code, reason } => {
                            tracing::info!("Push connection closed (code {:?}): {}", code, reason);
                            break;
                        }
                    }
                }
                inner.on_close();
            }
            Err(e) => {
                tracing::warn!("Push connection attempt failed: {}", e);
                inner.on_close();
            }
        }

        let delay = {
            let mut state = inner.state.lock();
            if state.manual_close {
                return;
            }
            state.policy.next_delay().map(|d| (d, state.policy.attempt()))
        };

        match delay {
            Some((delay, attempt)) => {
                tracing::info!("Reconnecting push transport in {:?} (attempt {})", delay, attempt);
                tokio::time::sleep(delay).await;
            }
            None => {
                tracing::warn!("Push transport retries exhausted");
                inner.bus.publish(MonitorEvent::PushExhausted);
                return;
            }
        }
    }
}

impl Inner {
    /// Returns false if a manual close raced the open.
    fn on_open(&self, outbound: mpsc::Sender<OutboundFrame>) -> bool {
        {
            let mut state = self.state.lock();
            if state.manual_close {
                let _ = outbound.try_send(OutboundFrame::Close);
                return false;
            }
            state.policy.reset();
            state.connected = true;
            state.down_announced = false;
            state.outbound = Some(outbound);
        }
        tracing::info!("Push transport connected");
        self.bus.publish(MonitorEvent::PushConnected);
        true
    }

    fn on_close(&self) {
        let announce = {
            let mut state = self.state.lock();
            state.connected = false;
            state.outbound = None;
            let announce = !state.manual_close && !state.down_announced;
            if announce {
                state.down_announced = true;
            }
            announce
        };
        if announce {
            self.bus.publish(MonitorEvent::PushDisconnected);
        }
    }

    fn handle_text(&self, text: &str) {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping malformed push message: {}", e);
                return;
            }
        };

        match message {
            InboundMessage::TelemetryLatest { data } => {
                self.apply_motor_updates(known_motors(data));
            }
            InboundMessage::StatusUpdate {
                motor_id,
                status,
                mut data,
            } => match MotorId::parse(&motor_id) {
                Some(motor) => {
                    data.status = Some(status);
                    self.apply_motor_updates(vec![(motor, data)]);
                }
                None => tracing::debug!("Status update for unknown motor {}", motor_id),
            },
            InboundMessage::SystemAlert(alert) => {
                tracing::info!("System alert ({:?}): {}", alert.severity, alert.message);
                self.bus.publish(MonitorEvent::SystemAlert(alert));
            }
            InboundMessage::KpiUpdate { data } => {
                self.store.set_kpi(data.clone());
                self.bus.publish(MonitorEvent::KpiUpdated { data });
            }
            InboundMessage::Unknown => {
                tracing::debug!("Ignoring push message of unknown type");
            }
        }
    }

    /// Threshold checks run before the update is merged and forwarded.
    fn apply_motor_updates(&self, updates: Vec<(MotorId, MotorFields)>) {
        if updates.is_empty() {
            return;
        }
        for (motor, fields) in &updates {
            self.evaluator.evaluate_fields(*motor, fields);
        }
        self.store.merge_motors(&updates, false);
        self.store.record_success(Utc::now());
        self.bus.publish(MonitorEvent::MotorsUpdated {
            motors: updates.iter().map(|(m, _)| *m).collect(),
            simulated: false,
        });
    }
}
