//! HTTP surface: manual/cron sync trigger and a liveness probe.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::task::JoinError;
use tracing::{error, instrument, warn};

use crate::reconcile::{ReconcileError, ReconcileReport, Reconciler};

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub poll_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(reconciler: Arc<Reconciler>, poll_secret: Option<String>) -> Self {
        Self {
            reconciler,
            poll_secret: poll_secret.map(Arc::from),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/pedidos/poll", post(poll_orders))
        .route("/health", get(health))
        .with_state(state)
}

/// Body of a successful sync, as the dashboard reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResponse {
    pub success: bool,
    pub novos: usize,
    pub atualizados: usize,
    pub total: usize,
    pub erros: Vec<String>,
}

impl From<ReconcileReport> for PollResponse {
    fn from(report: ReconcileReport) -> Self {
        Self {
            success: true,
            novos: report.created,
            atualizados: report.updated,
            total: report.total,
            erros: report.errors,
        }
    }
}

#[derive(Debug)]
enum PollError {
    Forbidden,
    Run(ReconcileError),
    Task(JoinError),
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            PollError::Forbidden => (StatusCode::FORBIDDEN, "invalid cron secret".to_string()),
            PollError::Run(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            PollError::Task(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("reconciliation task failed: {err}"),
            ),
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

fn secret_matches(given: Option<&str>, expected: &str) -> bool {
    given.is_some_and(|given| bool::from(given.as_bytes().ct_eq(expected.as_bytes())))
}

/// Runs the sync on its own task: a caller that hangs up does not cancel a
/// run halfway through its transaction.
#[instrument(skip_all)]
async fn poll_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PollResponse>, PollError> {
    if let Some(secret) = state.poll_secret.as_deref() {
        let given = headers
            .get(CRON_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if !secret_matches(given, secret) {
            warn!("poll rejected: bad or missing cron secret");
            return Err(PollError::Forbidden);
        }
    }

    let reconciler = Arc::clone(&state.reconciler);
    let run = tokio::spawn(async move { reconciler.run().await });
    match run.await {
        Ok(Ok(report)) => Ok(Json(PollResponse::from(report))),
        Ok(Err(err)) => {
            error!(error = %err, "poll failed");
            Err(PollError::Run(err))
        }
        Err(err) => {
            error!(error = %err, "reconciliation task did not finish");
            Err(PollError::Task(err))
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_comparison() {
        assert!(secret_matches(Some("s3cret"), "s3cret"));
        assert!(!secret_matches(Some("s3cres"), "s3cret"));
        assert!(!secret_matches(Some("s3cre"), "s3cret"));
        assert!(!secret_matches(Some(""), "s3cret"));
        assert!(!secret_matches(None, "s3cret"));
    }
}
