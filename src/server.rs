//! HTTP surface: buffer reads, serial writes and shutdown.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{FromRequest, Path, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::Error;
use crate::forwarder::Forwarder;
use crate::protocol;
use crate::ws;

/// Page served at `/` and `/readout/`.
const READOUT_HTML: &str = include_str!("../static/readout.html");

/// Body of the `/stop/` response.
pub const SHUTDOWN_MESSAGE: &str = "Server shut down";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<dyn Forwarder>,
    /// Cancelled by `/stop/` (or a signal) to begin shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(forwarder: Arc<dyn Forwarder>, shutdown: CancellationToken) -> Self {
        Self {
            forwarder,
            shutdown,
        }
    }
}

/// Forwarding errors as HTTP responses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(%status, "request failed: {}", self.0);
        (status, self.0.to_string()).into_response()
    }
}

/// Build the router with every route and permissive CORS.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(readout))
        .route("/readout/", get(readout))
        .route("/readout", get(readout))
        .route("/read/", get(read_buffer))
        .route("/read", get(read_buffer))
        .route("/lastread/", get(last_read))
        .route("/lastread", get(last_read))
        .route("/write", post(write_body))
        .route("/write/{*payload}", get(write_path))
        .route("/writecf/{*payload}", get(write_crlf_path))
        .route("/stop/", get(stop))
        .route("/stop", get(stop))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn readout() -> Html<&'static str> {
    Html(READOUT_HTML)
}

async fn read_buffer(State(state): State<AppState>) -> String {
    state.forwarder.read().await
}

async fn last_read(State(state): State<AppState>) -> String {
    state.forwarder.last_heard()
}

/// GET /write/{payload}: forward the decoded path, echo it back.
async fn write_path(
    State(state): State<AppState>,
    Path(payload): Path<String>,
) -> Result<String, ApiError> {
    forward(&state, payload, false).await
}

/// GET /writecf/{payload}: same as `/write/` with CRLF appended on the wire.
async fn write_crlf_path(
    State(state): State<AppState>,
    Path(payload): Path<String>,
) -> Result<String, ApiError> {
    forward(&state, payload, true).await
}

async fn forward(state: &AppState, payload: String, crlf: bool) -> Result<String, ApiError> {
    info!(crlf, "write: {payload:?}");
    let data = if crlf {
        protocol::encode_write_crlf(&payload)
    } else {
        protocol::encode_write(&payload)
    };
    state.forwarder.write(&data).await?;
    Ok(payload)
}

/// POST /write with a JSON or form body carrying `payload`: forward it, echo the body.
async fn write_body(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Value>, Response> {
    let body = if is_form(&request) {
        let Form(fields) = Form::<BTreeMap<String, String>>::from_request(request, &state)
            .await
            .map_err(IntoResponse::into_response)?;
        Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        )
    } else {
        let Json(body) = Json::<Value>::from_request(request, &state)
            .await
            .map_err(IntoResponse::into_response)?;
        body
    };

    let Some(payload) = body.get("payload").and_then(|p| p.as_str()) else {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "expected a string field `payload`",
        )
            .into_response());
    };
    info!("write: {body}");
    state
        .forwarder
        .write(&protocol::encode_write(payload))
        .await
        .map_err(|e| ApiError(e).into_response())?;
    Ok(Json(body))
}

fn is_form(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

/// GET /stop/: acknowledge, then trigger graceful shutdown.
async fn stop(State(state): State<AppState>) -> &'static str {
    info!("shutdown requested over HTTP");
    state.shutdown.cancel();
    SHUTDOWN_MESSAGE
}
