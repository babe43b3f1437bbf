// Typed event bus with synchronous, ordered delivery
use crate::domain::alert::{AlertRecord, SystemAlert};
use crate::domain::connection::ConnectionMode;
use crate::domain::motor::MotorId;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<K, E> {
    next_id: u64,
    handlers: Vec<(u64, K, Handler<E>)>,
}

/// Handlers grouped by kind, called in subscription order.
///
/// Handlers run outside the registry lock, so a handler may publish or
/// subscribe without deadlocking.
pub struct Listeners<K, E> {
    registry: Arc<Mutex<Registry<K, E>>>,
}

impl<K, E> Clone for Listeners<K, E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<K, E> Default for Listeners<K, E> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }
}

impl<K, E> Listeners<K, E>
where
    K: PartialEq + Copy + Send + Sync + 'static,
    E: 'static,
{
    pub fn subscribe<F>(&self, kind: K, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.push((id, kind, Arc::new(handler)));
            id
        };

        let weak: Weak<Mutex<Registry<K, E>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                registry.lock().handlers.retain(|(hid, _, _)| *hid != id);
            }
        })
    }

    pub fn notify(&self, kind: K, event: &E) {
        let handlers: Vec<Handler<E>> = self
            .registry
            .lock()
            .handlers
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, h)| h.clone())
            .collect();

        for handler in handlers {
            handler(event);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.registry.lock().handlers.len()
    }
}

/// Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes the handler"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PushConnected,
    PushDisconnected,
    PushExhausted,
    PollingExhausted,
    ModeChanged,
    AlertRaised,
    AlertUpdated,
    AlertResolved,
    CriticalAlert,
    SystemAlert,
    KpiUpdated,
    MotorsUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::PushConnected,
        EventKind::PushDisconnected,
        EventKind::PushExhausted,
        EventKind::PollingExhausted,
        EventKind::ModeChanged,
        EventKind::AlertRaised,
        EventKind::AlertUpdated,
        EventKind::AlertResolved,
        EventKind::CriticalAlert,
        EventKind::SystemAlert,
        EventKind::KpiUpdated,
        EventKind::MotorsUpdated,
    ];

    /// Wire name, matching the `event` tag of [`MonitorEvent`].
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::PushConnected => "push_connected",
            EventKind::PushDisconnected => "push_disconnected",
            EventKind::PushExhausted => "push_exhausted",
            EventKind::PollingExhausted => "polling_exhausted",
            EventKind::ModeChanged => "mode_changed",
            EventKind::AlertRaised => "alert_raised",
            EventKind::AlertUpdated => "alert_updated",
            EventKind::AlertResolved => "alert_resolved",
            EventKind::CriticalAlert => "critical_alert",
            EventKind::SystemAlert => "system_alert",
            EventKind::KpiUpdated => "kpi_updated",
            EventKind::MotorsUpdated => "motors_updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    PushConnected,
    PushDisconnected,
    PushExhausted,
    PollingExhausted,
    ModeChanged {
        from: ConnectionMode,
        to: ConnectionMode,
    },
    AlertRaised(AlertRecord),
    AlertUpdated(AlertRecord),
    AlertResolved(AlertRecord),
    /// Trigger for the visual/audible cue on the dashboard
    CriticalAlert(AlertRecord),
    SystemAlert(SystemAlert),
    KpiUpdated {
        data: serde_json::Value,
    },
    MotorsUpdated {
        motors: Vec<MotorId>,
        simulated: bool,
    },
}

impl MonitorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MonitorEvent::PushConnected => EventKind::PushConnected,
            MonitorEvent::PushDisconnected => EventKind::PushDisconnected,
            MonitorEvent::PushExhausted => EventKind::PushExhausted,
            MonitorEvent::PollingExhausted => EventKind::PollingExhausted,
            MonitorEvent::ModeChanged { .. } => EventKind::ModeChanged,
            MonitorEvent::AlertRaised(_) => EventKind::AlertRaised,
            MonitorEvent::AlertUpdated(_) => EventKind::AlertUpdated,
            MonitorEvent::AlertResolved(_) => EventKind::AlertResolved,
            MonitorEvent::CriticalAlert(_) => EventKind::CriticalAlert,
            MonitorEvent::SystemAlert(_) => EventKind::SystemAlert,
            MonitorEvent::KpiUpdated { .. } => EventKind::KpiUpdated,
            MonitorEvent::MotorsUpdated { .. } => EventKind::MotorsUpdated,
        }
    }
}

/// Composition-root owned bus for transport, mode and alert events.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Listeners<EventKind, MonitorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&MonitorEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(kind, handler)
    }

    /// Subscribe one handler to every kind; returns one handle per kind.
    pub fn subscribe_all<F>(&self, handler: F) -> Vec<Subscription>
    where
        F: Fn(&MonitorEvent) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        EventKind::ALL
            .into_iter()
            .map(|kind| {
                let handler = handler.clone();
                self.listeners.subscribe(kind, move |event| handler(event))
            })
            .collect()
    }

    pub fn publish(&self, event: MonitorEvent) {
        self.listeners.notify(event.kind(), &event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.handler_count()
    }
}
