//! HTTP request/response bodies and the mapping from daemon replies to them.

use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeError, ExecuteReply, ReplyOutcome};
use crate::catalog::CommandListing;
use crate::gateway::error::GatewayError;

/// Raw `POST /execute` body. Every field is optional at the JSON level so that shape
/// problems are reported by [`parse_execute_request`] rather than by serde.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteBody {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    /// Seconds. Missing or non-positive selects the gateway default.
    #[serde(default)]
    pub timeout: Option<i64>,
}

/// A well-formed execute request with the timeout already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteRequest {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: i64,
}

/// Bounds applied while shaping a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub default_timeout: i64,
    pub max_timeout: i64,
}

/// Parse and shape an execute request body.
pub fn parse_execute_request(
    body: &[u8],
    limits: RequestLimits,
) -> Result<ExecuteRequest, GatewayError> {
    let body: ExecuteBody = serde_json::from_slice(body)
        .map_err(|_| GatewayError::MalformedInput("invalid request format".to_string()))?;

    let command = match body.command {
        Some(c) if !c.is_empty() => c,
        _ => {
            return Err(GatewayError::MalformedInput(
                "command is not specified".to_string(),
            ))
        }
    };

    let timeout = match body.timeout {
        Some(t) if t > limits.max_timeout => {
            return Err(GatewayError::MalformedInput(format!(
                "timeout must be {} seconds or less",
                limits.max_timeout
            )))
        }
        Some(t) if t > 0 => t,
        _ => limits.default_timeout,
    };

    Ok(ExecuteRequest {
        command,
        args: body.args.unwrap_or_default(),
        timeout,
    })
}

/// `POST /execute` response body, for success and error alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub execution_time: String,
    pub error: String,
}

/// `GET /commands` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsResponse {
    pub commands: Vec<CommandListing>,
}

/// Map a decoded daemon reply. Only the outcome tag decides the result; the daemon's
/// error text is forwarded for policy violations and nowhere else.
pub fn map_reply(reply: ExecuteReply) -> Result<ExecuteResponse, GatewayError> {
    match reply.outcome {
        ReplyOutcome::Success | ReplyOutcome::NonZeroExit => Ok(ExecuteResponse {
            success: true,
            exit_code: reply.exit_code,
            stdout: reply.stdout,
            stderr: reply.stderr,
            execution_time: reply.execution_time,
            error: String::new(),
        }),
        ReplyOutcome::Rejected { violation } => Err(GatewayError::PolicyViolation {
            kind: violation,
            detail: reply.error_message,
        }),
        ReplyOutcome::Timeout => Err(GatewayError::ExecutionTimeout {
            execution_time: reply.execution_time,
        }),
        ReplyOutcome::SpawnFailure | ReplyOutcome::Invalid => Err(GatewayError::ExecutionFailure),
    }
}

/// Map a transport failure. A missed RPC deadline means the command outran its budget; a
/// call too large to send is the caller's fault, not the daemon's.
pub fn map_bridge_error(err: &BridgeError) -> GatewayError {
    match err {
        BridgeError::Deadline(d) => GatewayError::ExecutionTimeout {
            execution_time: crate::exec::format_duration(*d),
        },
        BridgeError::RequestTooLarge { .. } => {
            GatewayError::MalformedInput("request exceeds maximum message size".to_string())
        }
        _ => GatewayError::TransportFailure,
    }
}
