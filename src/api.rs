//! HTTP surface for the batch entry point.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::automation::{Automation, AutomationRequest, AutomationResponse};

/// Build the router: `POST /api/automation` and `GET /health`.
pub fn automation_routes(automation: Arc<Automation>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/automation", post(run_automation))
        .layer(CorsLayer::permissive())
        .with_state(automation)
}

async fn health() -> &'static str {
    "ok"
}

async fn run_automation(
    State(automation): State<Arc<Automation>>,
    payload: Result<Json<AutomationRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected automation request");
            let response = AutomationResponse {
                success: false,
                outcome: None,
                error: Some(rejection.body_text()),
                request_error: true,
            };
            return (StatusCode::BAD_REQUEST, Json(response));
        }
    };

    let response = automation.run(&request).await;
    let status = if response.success {
        StatusCode::OK
    } else if response.request_error {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(response))
}
