//! Gateway-side bridge client. Every call opens its own connection, so a daemon restart is
//! picked up by the next request without any reconnect bookkeeping.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;

use crate::bridge::protocol::{
    read_frame, write_frame, ExecuteCall, ExecuteReply, FrameError, ReplyOutcome,
    MAX_REQUEST_FRAME, MAX_RESPONSE_FRAME,
};

/// Transport-level failure talking to the daemon. A decoded reply, whatever its outcome,
/// is never a `BridgeError`.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("connecting to daemon at {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The call itself is over the request frame ceiling; nothing was sent.
    #[error("call of {len} bytes exceeds the request limit of {limit} bytes")]
    RequestTooLarge { len: usize, limit: usize },
    #[error("daemon exchange failed: {0}")]
    Frame(#[from] FrameError),
    #[error("daemon closed the connection without replying")]
    Closed,
    #[error("no reply from daemon within {0:?}")]
    Deadline(Duration),
    #[error("reply id {got:?} does not match call id {want:?}")]
    IdMismatch { want: String, got: String },
}

/// Something that can carry an execute call to the daemon. The gateway depends on this,
/// not on the socket client directly.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Send one call and wait at most `deadline` for its reply.
    async fn execute(&self, call: ExecuteCall, deadline: Duration)
        -> Result<ExecuteReply, BridgeError>;

    /// Liveness probe: issue a call the daemon must reject. Any reply means the channel is
    /// healthy; only a transport failure means it is not.
    async fn probe(&self, deadline: Duration) -> Result<(), BridgeError> {
        let call = ExecuteCall {
            id: new_call_id(),
            command: String::new(),
            args: Vec::new(),
            timeout: 1,
        };
        let reply = self.execute(call, deadline).await?;
        if !matches!(reply.outcome, ReplyOutcome::Rejected { .. }) {
            log::debug!("probe got unexpected outcome {:?}", reply.outcome);
        }
        Ok(())
    }
}

pub fn new_call_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Bridge client bound to a socket path. The write half stays open until the reply has been
/// read: the daemon treats EOF from the caller as a cancelled call.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn exchange(&self, call: &ExecuteCall) -> Result<ExecuteReply, BridgeError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| BridgeError::Connect {
                path: self.socket_path.display().to_string(),
                source,
            })?;
        write_frame(&mut stream, call, MAX_REQUEST_FRAME)
            .await
            .map_err(|e| match e {
                FrameError::TooLarge { len, limit } => BridgeError::RequestTooLarge { len, limit },
                other => BridgeError::Frame(other),
            })?;
        let reply: ExecuteReply = read_frame(&mut stream, MAX_RESPONSE_FRAME)
            .await?
            .ok_or(BridgeError::Closed)?;
        if reply.id != call.id {
            return Err(BridgeError::IdMismatch {
                want: call.id.clone(),
                got: reply.id,
            });
        }
        Ok(reply)
    }
}

#[async_trait]
impl ExecutionBackend for DaemonClient {
    async fn execute(
        &self,
        call: ExecuteCall,
        deadline: Duration,
    ) -> Result<ExecuteReply, BridgeError> {
        // Dropping the exchange on deadline closes the socket; the daemon treats that as
        // a cancelled call and kills the child.
        tokio::time::timeout(deadline, self.exchange(&call))
            .await
            .map_err(|_| BridgeError::Deadline(deadline))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_socket_is_a_connect_error() {
        let path = std::env::temp_dir().join(format!("cmdrelay-absent-{}.sock", new_call_id()));
        let client = DaemonClient::new(&path);
        let err = client.probe(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Connect { .. }));
        assert!(err.to_string().contains("cmdrelay-absent-"));
    }

    struct Rejecting;

    #[async_trait]
    impl ExecutionBackend for Rejecting {
        async fn execute(
            &self,
            call: ExecuteCall,
            _deadline: Duration,
        ) -> Result<ExecuteReply, BridgeError> {
            Ok(ExecuteReply {
                id: call.id,
                success: false,
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                execution_time: String::new(),
                error_message: "command '' is not allowed".to_string(),
                outcome: ReplyOutcome::Rejected {
                    violation: crate::policy::ViolationKind::CommandNotAllowed,
                },
            })
        }
    }

    #[tokio::test]
    async fn probe_treats_rejection_as_healthy() {
        assert!(Rejecting.probe(Duration::from_secs(1)).await.is_ok());
    }
}
