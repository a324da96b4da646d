//! Gateway HTTP server: request shaping, the bridge call, and response mapping.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bridge::{new_call_id, DaemonClient, ExecuteCall, ExecutionBackend};
use crate::catalog::{CommandCatalog, CommandListing};
use crate::config::{self, Config, GatewayConfig};
use crate::gateway::error::GatewayError;
use crate::gateway::protocol::{
    map_bridge_error, map_reply, parse_execute_request, CommandsResponse, ExecuteResponse,
    RequestLimits,
};
use crate::signal;

/// Added to the request timeout to form the RPC deadline, so the daemon's own timeout
/// classification normally arrives first.
pub const RPC_DEADLINE_SLACK: Duration = Duration::from_secs(2);

const HTTP_TARGET: &str = "cmdrelay::http";

/// Shared state for gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub backend: Arc<dyn ExecutionBackend>,
    /// Catalog projection from the shared config file. Display only.
    pub commands: Arc<Vec<CommandListing>>,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        backend: Arc<dyn ExecutionBackend>,
        commands: Vec<CommandListing>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            commands: Arc::new(commands),
        }
    }

    fn request_limits(&self) -> RequestLimits {
        RequestLimits {
            default_timeout: self.config.effective_default_timeout(),
            max_timeout: self.config.effective_max_request_timeout(),
        }
    }
}

/// Build the gateway router over `state`.
pub fn router(state: GatewayState) -> Router {
    let body_limit = state.config.effective_max_body_size();
    Router::new()
        .route("/execute", post(execute_http))
        .route("/commands", get(commands_http))
        .route("/health", get(health_http))
        .route("/ready", get(ready_http))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Run the gateway until SIGINT/SIGTERM. The socket path in `config` is used as given;
/// env/flag overrides are applied by the caller.
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "gateway bound to non-loopback address {}; callers are not authenticated",
            bind
        );
    }

    let commands = CommandCatalog::new(config.commands.clone())
        .context("invalid command catalog")?
        .listing();
    if commands.is_empty() {
        log::warn!("no commands defined in configuration; /commands will be empty");
    }

    let client = DaemonClient::new(config.socket.path.clone());
    match client.probe(config.gateway.ready_timeout()).await {
        Ok(()) => log::info!("daemon reachable at {}", client.socket_path().display()),
        Err(e) => log::warn!(
            "daemon not reachable ({}); requests will fail until it is available",
            e
        ),
    }

    let port = config.gateway.port;
    let state = GatewayState::new(config.gateway, Arc::new(client), commands);
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(signal::shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Access log: method, path, status, latency.
async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let res = next.run(req).await;
    log::info!(
        target: HTTP_TARGET,
        "{} {} {} {:?}",
        method,
        path,
        res.status().as_u16(),
        started.elapsed()
    );
    res
}

/// POST /execute
async fn execute_http(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<ExecuteResponse>, GatewayError> {
    let req = parse_execute_request(&body, state.request_limits())?;
    let deadline = Duration::from_secs(req.timeout.max(0) as u64) + RPC_DEADLINE_SLACK;
    let call = ExecuteCall {
        id: new_call_id(),
        command: req.command,
        args: req.args,
        timeout: i32::try_from(req.timeout).unwrap_or(i32::MAX),
    };
    log::debug!("execute {} {:?} (id {})", call.command, call.args, call.id);

    let id = call.id.clone();
    let reply = state.backend.execute(call, deadline).await.map_err(|e| {
        log::warn!("bridge call {} failed: {}", id, e);
        map_bridge_error(&e)
    })?;
    map_reply(reply).map(Json).map_err(|e| {
        if let GatewayError::PolicyViolation { kind, .. } = &e {
            log::info!("call {} rejected: {}", id, kind.as_str());
        }
        e
    })
}

/// GET /commands
async fn commands_http(State(state): State<GatewayState>) -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: state.commands.as_ref().clone(),
    })
}

/// GET /health: process liveness only.
async fn health_http() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /ready: probes the daemon.
async fn ready_http(State(state): State<GatewayState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.backend.probe(state.config.ready_timeout()).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            log::debug!("readiness probe failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "error": GatewayError::TransportFailure.to_string(),
                })),
            )
        }
    }
}
