use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use constant_time_eq::constant_time_eq;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use crate::{
    chain::{self, ContractCall, ContractInvoker},
    metrics,
};

const MAX_CONCURRENT_REQUESTS: usize = 16;
const MAX_BODY_BYTES: usize = 16 * 1024;

// API state
pub struct ApiState<C> {
    pub invoker: Arc<C>,
    pub heartbeat: Option<ContractCall>,
    pub explorer_tx_url: String,
    pub trigger_user_agent: String,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
    pub transaction_hash: String,
    pub tx_url: String,
    pub timestamp: String,
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("access denied")]
    AccessDenied,
    #[error("incomplete configuration")]
    IncompleteConfiguration(String),
    #[error("cron job failed")]
    Failed(String),
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            TriggerError::AccessDenied => {
                (StatusCode::FORBIDDEN, json!({ "error": self.to_string() }))
            }
            TriggerError::IncompleteConfiguration(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.to_string(), "message": message }),
            ),
            TriggerError::Failed(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": self.to_string(),
                    "message": message,
                    "timestamp": Utc::now().to_rfc3339(),
                }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

// Set up API router
pub fn create_api_router<C>(state: Arc<ApiState<C>>) -> Router
where
    C: ContractInvoker + Send + Sync + 'static,
{
    Router::new()
        .route("/api/cron", get(trigger_cron::<C>).post(trigger_cron::<C>))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
}

fn is_authorized(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(header::USER_AGENT)
        .map(|value| constant_time_eq(value.as_bytes(), expected.as_bytes()))
        .unwrap_or(false)
}

async fn trigger_cron<C>(
    State(state): State<Arc<ApiState<C>>>,
    headers: HeaderMap,
) -> Result<Json<TriggerResponse>, TriggerError>
where
    C: ContractInvoker + Send + Sync + 'static,
{
    if !is_authorized(&headers, &state.trigger_user_agent) {
        warn!(
            user_agent = ?headers.get(header::USER_AGENT),
            "Rejected cron trigger"
        );
        return Err(TriggerError::AccessDenied);
    }

    let call = state.heartbeat.as_ref().ok_or_else(|| {
        error!("Cron trigger called without CRON1_CONTRACT_ADDRESS");
        TriggerError::IncompleteConfiguration("CRON1_CONTRACT_ADDRESS is not set".to_string())
    })?;

    info!(entrypoint = %call.entrypoint, "Cron trigger accepted");

    let submitted = chain::submit(state.invoker.as_ref(), call, &state.explorer_tx_url)
        .await
        .map_err(|e| TriggerError::Failed(e.to_string()))?;

    Ok(Json(TriggerResponse {
        success: true,
        message: format!("{} executed", call.entrypoint),
        transaction_hash: submitted.transaction_hash,
        tx_url: submitted.tx_url,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

async fn health() -> &'static str {
    "OK"
}

async fn metrics_endpoint() -> String {
    metrics::metrics_handler()
}
