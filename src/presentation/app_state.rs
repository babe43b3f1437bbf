// Application state for HTTP handlers
use crate::application::alert_evaluator::AlertEvaluator;
use crate::application::event_bus::EventBus;
use crate::application::history_service::HistoryService;
use crate::application::monitor::Monitor;
use crate::application::state_store::StateStore;
use crate::infrastructure::credentials::Credentials;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StateStore>,
    pub evaluator: Arc<AlertEvaluator>,
    pub history: HistoryService,
    pub monitor: Arc<Monitor>,
    pub bus: EventBus,
    pub credentials: Credentials,
}
