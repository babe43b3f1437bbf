// HTTP request handlers
use crate::application::alert_evaluator::AlertSummary;
use crate::application::polling::PollingMetrics;
use crate::application::state_store::StateSnapshot;
use crate::domain::alert::AlertRecord;
use crate::domain::connection::ConnectionState;
use crate::domain::motor::{MotorId, Variable};
use crate::domain::telemetry::{HistoryQuery, TimeSeriesPoint};
use crate::infrastructure::error::MonitorError;
use crate::presentation::app_state::AppState;
use crate::presentation::sse::sse_response;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_RANGE: &str = "24h";
const DEFAULT_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub variable: String,
    pub motor: String,
    pub range: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub active: Vec<AlertRecord>,
    pub history: Vec<AlertRecord>,
    pub summary: AlertSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingMetricsResponse {
    #[serde(flatten)]
    pub metrics: PollingMetrics,
    pub in_flight: bool,
}

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    pub connection: ConnectionState,
    pub push_enabled: bool,
    pub push_connected: bool,
    pub push_retry_attempt: u32,
}

/// JSON error body with a status derived from the failure.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        let status = match &e {
            MonitorError::MissingCredential => StatusCode::UNAUTHORIZED,
            MonitorError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            MonitorError::NotConnected | MonitorError::AlreadyConnected => StatusCode::CONFLICT,
            MonitorError::Http(_)
            | MonitorError::Status { .. }
            | MonitorError::Decode(_)
            | MonitorError::Transport(_) => StatusCode::BAD_GATEWAY,
            MonitorError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateSnapshot> {
    Json(state.store.snapshot())
}

pub async fn get_alerts(State(state): State<Arc<AppState>>) -> Json<AlertsResponse> {
    Json(AlertsResponse {
        active: state.evaluator.active_alerts(),
        history: state.evaluator.history(),
        summary: state.evaluator.summary(),
    })
}

/// Manual resolution. Unknown, malformed or already resolved ids are accepted silently.
pub async fn resolve_alert(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> StatusCode {
    match Uuid::parse_str(&id) {
        Ok(id) => {
            state.evaluator.resolve(id);
        }
        Err(_) => tracing::debug!("Ignoring resolve for malformed alert id {}", id),
    }
    StatusCode::NO_CONTENT
}

pub async fn get_history(
    Query(params): Query<HistoryParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TimeSeriesPoint>>, ApiError> {
    if MotorId::parse(&params.motor).is_none() {
        return Err(ApiError::bad_request(format!("unknown motor '{}'", params.motor)));
    }
    if Variable::parse(&params.variable).is_none() {
        return Err(ApiError::bad_request(format!("unknown variable '{}'", params.variable)));
    }

    let query = HistoryQuery {
        variable: params.variable,
        motor: params.motor,
        range: params.range.unwrap_or_else(|| DEFAULT_RANGE.to_string()),
        limit: params.limit.unwrap_or(DEFAULT_LIMIT),
    };

    match state.history.history(&query).await {
        Ok(points) => Ok(Json(points)),
        Err(e) => {
            tracing::warn!("History request failed for {}: {}", query.cache_key(), e);
            Err(e.into())
        }
    }
}

pub async fn get_polling_metrics(State(state): State<Arc<AppState>>) -> Json<PollingMetricsResponse> {
    let polling = state.monitor.polling();
    Json(PollingMetricsResponse {
        metrics: polling.metrics(),
        in_flight: polling.is_in_flight(),
    })
}

pub async fn push_send(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let push = state.monitor.push().ok_or(MonitorError::NotConnected)?;
    push.send(&payload).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Login hands the API credential to the service; later requests pick it up.
pub async fn set_token(State(state): State<Arc<AppState>>, Json(body): Json<TokenBody>) -> StatusCode {
    let token = body.token.filter(|t| !t.trim().is_empty());
    tracing::info!("API credential {}", if token.is_some() { "updated" } else { "cleared" });
    state.credentials.set_token(token);
    StatusCode::NO_CONTENT
}

pub async fn get_connection(State(state): State<Arc<AppState>>) -> Json<ConnectionResponse> {
    let push = state.monitor.push();
    Json(ConnectionResponse {
        connection: state.store.connection(),
        push_enabled: push.is_some(),
        push_connected: push.is_some_and(|p| p.is_connected()),
        push_retry_attempt: push.map_or(0, |p| p.retry_attempt()),
    })
}

pub async fn stream_events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    sse_response(&state.bus, &state.store)
}
