//! Gateway HTTP server: health check plus the chat endpoint in front of the bridge.

use crate::bridge::{Bridge, BridgeError};
use crate::config::Config;
use crate::gateway::protocol::parse_chat_request;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use futures_util::FutureExt;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

const DEFAULT_ALLOW_HEADERS: &str = "Content-Type, Authorization, Accept";

/// Shared state for the gateway (config and the bridge).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub bridge: Bridge,
}

impl GatewayState {
    /// Resolve upstream settings once and build the bridge.
    pub fn new(config: Config) -> Self {
        let bridge = Bridge::from_config(&config);
        Self {
            config: Arc::new(config),
            bridge,
        }
    }
}

/// Routes: `GET /` health and the chat endpoint at `config.gateway.path` (all methods; non-POST handled inside).
pub fn router(state: GatewayState) -> Router {
    let path = state.config.gateway.path.clone();
    let path = if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    };
    Router::new()
        .route("/", get(health_http))
        .route(&path, any(chat_endpoint))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let chat_path = config.gateway.path.clone();
    let state = GatewayState::new(config);
    if let Err(e) = crate::bridge::candidates::validate(state.bridge.settings()) {
        log::warn!("upstream not fully configured, chat calls will fail: {}", e);
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {} (chat at {})", bind_addr, chat_path);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON for liveness checks.
async fn health_http(State(state): State<GatewayState>) -> Json<Value> {
    let configured = crate::bridge::candidates::validate(state.bridge.settings()).is_ok();
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "path": state.config.gateway.path,
        "upstreamConfigured": configured,
    }))
}

/// CORS headers for every chat-path response. Allowed headers echo the preflight request.
fn cors_headers(request_headers: &HeaderMap) -> HeaderMap {
    let mut h = HeaderMap::new();
    let allow = request_headers
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOW_HEADERS));
    h.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    h.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    h.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allow);
    h.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    h.insert(
        header::VARY,
        HeaderValue::from_static("Origin, Access-Control-Request-Headers, Access-Control-Request-Method"),
    );
    h
}

fn json_response(status: StatusCode, cors: HeaderMap, body: Value) -> Response {
    (status, cors, Json(body)).into_response()
}

fn error_response(err: &BridgeError, cors: HeaderMap) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    json_response(status, cors, err.to_body())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Chat endpoint: POST runs the bridge, OPTIONS answers preflight, anything else is 405.
async fn chat_endpoint(
    State(state): State<GatewayState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let cors = cors_headers(&headers);
    if method == Method::OPTIONS {
        return (StatusCode::OK, cors).into_response();
    }
    if method != Method::POST {
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            cors,
            json!({ "error": "Method not allowed" }),
        );
    }

    let request_id = uuid::Uuid::new_v4().to_string();
    let call = parse_chat_request(&body).into_call();
    log::debug!("[{}] inbound {:?}", request_id, call_kind(&call));

    let handled = AssertUnwindSafe(state.bridge.handle(&request_id, call))
        .catch_unwind()
        .await;
    match handled {
        Ok(Ok(reply)) => json_response(StatusCode::OK, cors, reply.to_body()),
        Ok(Err(err)) => error_response(&err, cors),
        Err(panic) => {
            let details = panic_message(panic.as_ref());
            log::error!("[{}] unhandled fault: {}", request_id, details);
            error_response(&BridgeError::Internal(details), cors)
        }
    }
}

fn call_kind(call: &crate::bridge::BridgeCall) -> &'static str {
    match call {
        crate::bridge::BridgeCall::Trigger(_) => "trigger",
        crate::bridge::BridgeCall::StatusOnly { .. } => "status_only",
    }
}
