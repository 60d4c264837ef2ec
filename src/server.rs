//! HTTP surface: thin axum wiring over the dispatcher.
//!
//! Routing, CORS, and JSON extraction only; all orchestration lives in
//! [`crate::dispatcher`].

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Debug, Deserialize)]
pub struct AssembleRequest {
    pub id: Option<String>,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub id: String,
    pub enabled: bool,
}

/// `Error` → HTTP status. Client mistakes are 4xx; the worker acting up is
/// an upstream failure.
fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::SessionNotFound { .. } => StatusCode::NOT_FOUND,
        Error::InvalidToggle(_) => StatusCode::CONFLICT,
        Error::WorkerReported(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::RegistryFull(_) => StatusCode::TOO_MANY_REQUESTS,
        Error::WorkerTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::WorkerUnavailable(_) | Error::WorkerCrashed(_) | Error::Protocol { .. } => {
            StatusCode::BAD_GATEWAY
        }
        Error::Config(_) | Error::Io(_) | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &Error) -> Response {
    let body = json!({ "error": err.to_string(), "kind": err.kind() });
    (status_for(err), Json(body)).into_response()
}

fn respond<T: serde::Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => {
            tracing::debug!(kind = err.kind(), error = %err, "request failed");
            error_response(&err)
        }
    }
}

async fn assemble(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(req): Json<AssembleRequest>,
) -> Response {
    match dispatcher.assemble(req.id.as_deref(), &req.code).await {
        Ok(outcome) => Json(json!({
            "id": outcome.id,
            "machine_code": outcome.response.machine_code,
            "data_segment": outcome.response.data_segment,
        }))
        .into_response(),
        Err(err) => error_response(&err),
    }
}

async fn step(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(req): Json<SessionRequest>,
) -> Response {
    respond(dispatcher.step(&req.id).await)
}

async fn run(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(req): Json<SessionRequest>,
) -> Response {
    respond(dispatcher.run(&req.id).await)
}

async fn pipeline(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(req): Json<ToggleRequest>,
) -> Response {
    respond(dispatcher.set_pipeline(&req.id, req.enabled).await)
}

async fn data_forward(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(req): Json<ToggleRequest>,
) -> Response {
    respond(dispatcher.set_data_forwarding(&req.id, req.enabled).await)
}

async fn branch_prediction(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(req): Json<ToggleRequest>,
) -> Response {
    respond(dispatcher.set_branch_prediction(&req.id, req.enabled).await)
}

async fn reset(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(req): Json<SessionRequest>,
) -> Response {
    match dispatcher.reset(&req.id).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn healthz(State(dispatcher): State<Arc<Dispatcher>>) -> Response {
    let sessions = dispatcher.session_count().await;
    Json(json!({ "status": "ok", "sessions": sessions })).into_response()
}

pub fn build_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/assemble", post(assemble))
        .route("/step", post(step))
        .route("/run", post(run))
        .route("/pipeline", post(pipeline))
        .route("/data_forward", post(data_forward))
        .route("/branch_prediction", post(branch_prediction))
        .route("/reset", post(reset))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .with_state(dispatcher)
}

/// Bind and serve until the process is stopped.
pub async fn serve(addr: &str, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, build_router(dispatcher))
        .await
        .map_err(Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(
            status_for(&Error::session_not_found("s1")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::invalid_toggle("x")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Error::worker_reported("syntax error")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&Error::WorkerTimeout(std::time::Duration::from_secs(5))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(status_for(&Error::crashed("gone")), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(&Error::RegistryFull(64)),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
