// Process-wide monitor state with per-section change notification
use crate::application::event_bus::{Listeners, Subscription};
use crate::domain::connection::{ConnectionMode, ConnectionState};
use crate::domain::motor::{MotorFields, MotorId, MotorReading};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Motors,
    Connection,
    Kpi,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    pub data: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub motors: BTreeMap<MotorId, MotorReading>,
    pub connection: ConnectionState,
    pub kpi: Option<KpiSnapshot>,
}

struct StateInner {
    snapshot: StateSnapshot,
    last_activity: Option<Instant>,
}

/// Owner of motor, connection and KPI state.
///
/// Built once by the composition root and shared by `Arc`; subscribers are
/// notified synchronously after each mutation of their section.
pub struct StateStore {
    inner: Mutex<StateInner>,
    listeners: Listeners<Section, StateSnapshot>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let motors = MotorId::ALL
            .into_iter()
            .map(|id| (id, MotorReading::default()))
            .collect();

        Self {
            inner: Mutex::new(StateInner {
                snapshot: StateSnapshot {
                    motors,
                    connection: ConnectionState::default(),
                    kpi: None,
                },
                last_activity: None,
            }),
            listeners: Listeners::default(),
        }
    }

    pub fn subscribe<F>(&self, section: Section, handler: F) -> Subscription
    where
        F: Fn(&StateSnapshot) + Send + Sync + 'static,
    {
        self.listeners.subscribe(section, handler)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.inner.lock().snapshot.clone()
    }

    pub fn connection(&self) -> ConnectionState {
        self.inner.lock().snapshot.connection.clone()
    }

    pub fn mode(&self) -> ConnectionMode {
        self.inner.lock().snapshot.connection.mode
    }

    pub fn motor(&self, id: MotorId) -> MotorReading {
        self.inner
            .lock()
            .snapshot
            .motors
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the previous mode.
    pub fn set_mode(&self, mode: ConnectionMode) -> ConnectionMode {
        self.mutate(Section::Connection, |inner| {
            std::mem::replace(&mut inner.snapshot.connection.mode, mode)
        })
    }

    pub fn reset_errors(&self) {
        self.mutate(Section::Connection, |inner| {
            inner.snapshot.connection.consecutive_errors = 0;
        });
    }

    pub fn record_success(&self, at: DateTime<Utc>) {
        self.mutate(Section::Connection, |inner| {
            inner.snapshot.connection.last_success = Some(at);
            inner.snapshot.connection.consecutive_errors = 0;
        });
    }

    /// Returns the new consecutive error count.
    pub fn record_failure(&self) -> u32 {
        self.mutate(Section::Connection, |inner| {
            let errors = &mut inner.snapshot.connection.consecutive_errors;
            *errors = errors.saturating_add(1);
            *errors
        })
    }

    /// Shallow-merge field updates into the motor table.
    pub fn merge_motors(&self, updates: &[(MotorId, MotorFields)], simulated: bool) {
        if updates.is_empty() {
            return;
        }
        let now = Utc::now();
        self.mutate(Section::Motors, |inner| {
            for (id, fields) in updates {
                inner
                    .snapshot
                    .motors
                    .entry(*id)
                    .or_default()
                    .merge(fields, now, simulated);
            }
            inner.last_activity = Some(Instant::now());
        });
    }

    pub fn set_kpi(&self, data: serde_json::Value) {
        self.mutate(Section::Kpi, |inner| {
            inner.snapshot.kpi = Some(KpiSnapshot {
                data,
                received_at: Utc::now(),
            });
            inner.last_activity = Some(Instant::now());
        });
    }

    /// Count "now" as the latest update, used when monitoring starts.
    pub fn mark_activity(&self) {
        self.inner.lock().last_activity = Some(Instant::now());
    }

    pub fn last_activity(&self) -> Option<Instant> {
        self.inner.lock().last_activity
    }

    fn mutate<R>(&self, section: Section, f: impl FnOnce(&mut StateInner) -> R) -> R {
        let (result, snapshot) = {
            let mut inner = self.inner.lock();
            let result = f(&mut inner);
            (result, inner.snapshot.clone())
        };
        self.listeners.notify(section, &snapshot);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_initial_state() {
        let store = StateStore::new();
        let snapshot = store.snapshot();

        assert_eq!(snapshot.connection.mode, ConnectionMode::None);
        assert_eq!(snapshot.connection.consecutive_errors, 0);
        assert_eq!(snapshot.motors.len(), 2);
        assert!(store.last_activity().is_none());
    }

    #[test]
    fn test_failure_counter_and_success_reset() {
        let store = StateStore::new();

        assert_eq!(store.record_failure(), 1);
        assert_eq!(store.record_failure(), 2);

        store.record_success(Utc::now());
        let connection = store.connection();
        assert_eq!(connection.consecutive_errors, 0);
        assert!(connection.last_success.is_some());
    }

    #[test]
    fn test_section_subscribers_are_notified() {
        let store = StateStore::new();
        let modes = Arc::new(Mutex::new(Vec::new()));
        let motor_updates = Arc::new(Mutex::new(0));

        let m = modes.clone();
        let _conn = store.subscribe(Section::Connection, move |s| {
            m.lock().push(s.connection.mode)
        });
        let u = motor_updates.clone();
        let _motors = store.subscribe(Section::Motors, move |_| *u.lock() += 1);

        store.set_mode(ConnectionMode::Polling);
        store.merge_motors(
            &[(
                MotorId::Motor2,
                MotorFields {
                    temperature: Some(81.0),
                    ..Default::default()
                },
            )],
            false,
        );

        assert_eq!(*modes.lock(), vec![ConnectionMode::Polling]);
        assert_eq!(*motor_updates.lock(), 1);
        assert_eq!(store.motor(MotorId::Motor2).temperature, 81.0);
        assert!(store.last_activity().is_some());
    }

    #[test]
    fn test_empty_merge_is_not_activity() {
        let store = StateStore::new();
        store.merge_motors(&[], false);
        assert!(store.last_activity().is_none());
    }
}
