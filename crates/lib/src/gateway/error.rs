//! Gateway error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::exec::{SPAWN_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};
use crate::gateway::protocol::ExecuteResponse;
use crate::policy::ViolationKind;

/// Every non-success outcome of `POST /execute`. Messages for timeouts, execution failures and
/// transport failures are fixed strings; internal detail never reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Unparseable payload or bad request shape. The message describes the shape problem.
    #[error("{0}")]
    MalformedInput(String),

    /// Allow-list rejection; the detail names the offending command or argument.
    #[error("{detail}")]
    PolicyViolation { kind: ViolationKind, detail: String },

    #[error("command execution timed out")]
    ExecutionTimeout { execution_time: String },

    #[error("execution failed")]
    ExecutionFailure,

    #[error("daemon connection failed")]
    TransportFailure,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::PolicyViolation { .. } => StatusCode::FORBIDDEN,
            GatewayError::ExecutionTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            GatewayError::ExecutionFailure => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::TransportFailure => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn body(&self) -> ExecuteResponse {
        let mut body = ExecuteResponse {
            success: false,
            error: self.to_string(),
            ..ExecuteResponse::default()
        };
        match self {
            GatewayError::ExecutionTimeout { execution_time } => {
                body.exit_code = TIMEOUT_EXIT_CODE;
                body.execution_time = execution_time.clone();
            }
            GatewayError::ExecutionFailure => body.exit_code = SPAWN_FAILURE_EXIT_CODE,
            _ => {}
        }
        body
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            GatewayError::MalformedInput("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::PolicyViolation {
                kind: ViolationKind::CommandNotAllowed,
                detail: "command 'rm' is not allowed".into()
            }
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::ExecutionTimeout {
                execution_time: "1s".into()
            }
            .status(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            GatewayError::ExecutionFailure.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::TransportFailure.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn bodies_carry_generic_messages_and_sentinels() {
        let t = GatewayError::ExecutionTimeout {
            execution_time: "5.001s".into(),
        }
        .body();
        assert_eq!(t.exit_code, -1);
        assert_eq!(t.error, "command execution timed out");
        assert_eq!(t.execution_time, "5.001s");

        let f = GatewayError::ExecutionFailure.body();
        assert_eq!(f.exit_code, -2);
        assert_eq!(f.error, "execution failed");
        assert!(!f.success);

        let v = GatewayError::PolicyViolation {
            kind: ViolationKind::ArgumentNotAllowed,
            detail: "argument '-R' is not allowed for command 'ls'".into(),
        }
        .body();
        assert_eq!(v.error, "argument '-R' is not allowed for command 'ls'");
    }
}
