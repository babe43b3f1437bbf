// Server-sent event stream for the dashboard
use crate::application::event_bus::{EventBus, MonitorEvent};
use crate::application::state_store::{Section, StateSnapshot, StateStore};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio::sync::mpsc;

const CLIENT_BUFFER: usize = 256;

enum Outgoing {
    Bus(MonitorEvent),
    State(StateSnapshot),
}

impl Outgoing {
    fn to_event(&self) -> Result<Event, axum::Error> {
        match self {
            Outgoing::Bus(event) => Event::default().event(event.kind().name()).json_data(event),
            Outgoing::State(snapshot) => Event::default().event("state").json_data(snapshot),
        }
    }
}

/// Forward bus events and state snapshots to one client.
///
/// Handlers are synchronous, so frames go through a bounded channel; a
/// client that falls this far behind loses frames instead of stalling the
/// publishers. Dropping the stream unsubscribes.
pub fn event_stream(
    bus: &EventBus,
    store: &StateStore,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static + use<> {
    let (tx, mut rx) = mpsc::channel::<Outgoing>(CLIENT_BUFFER);

    let bus_tx = tx.clone();
    let mut subscriptions = bus.subscribe_all(move |event| {
        if bus_tx.try_send(Outgoing::Bus(event.clone())).is_err() {
            tracing::debug!("SSE client lagging, dropped {}", event.kind().name());
        }
    });
    for section in [Section::Motors, Section::Connection, Section::Kpi] {
        let tx = tx.clone();
        subscriptions.push(store.subscribe(section, move |snapshot| {
            if tx.try_send(Outgoing::State(snapshot.clone())).is_err() {
                tracing::debug!("SSE client lagging, dropped state snapshot");
            }
        }));
    }
    tracing::debug!("SSE client attached, {} bus handlers", bus.subscriber_count());

    // Current state first so a fresh client can render immediately
    let initial = Outgoing::State(store.snapshot());

    async_stream::stream! {
        let _subscriptions = subscriptions;
        let mut next = Some(initial);
        loop {
            let frame = match next.take() {
                Some(frame) => frame,
                None => match rx.recv().await {
                    Some(frame) => frame,
                    None => break,
                },
            };
            match frame.to_event() {
                Ok(event) => yield Ok(event),
                Err(e) => tracing::warn!("Failed to encode SSE event: {}", e),
            }
        }
    }
}

pub fn sse_response(
    bus: &EventBus,
    store: &StateStore,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static + use<>> {
    Sse::new(event_stream(bus, store)).keep_alive(KeepAlive::default())
}
