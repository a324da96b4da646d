//! Bridge wire protocol: length-prefixed JSON frames over the daemon socket.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of JSON. Requests and
//! replies have separate size ceilings; a length over the ceiling is refused before any
//! payload is read.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::policy::ViolationKind;

/// Ceiling for a call frame (command + args).
pub const MAX_REQUEST_FRAME: usize = 1024 * 1024;
/// Ceiling for a reply frame (admits substantial command output).
pub const MAX_RESPONSE_FRAME: usize = 10 * 1024 * 1024;

/// One `Execute` call from the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteCall {
    /// Correlates the reply and the audit log entries.
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Requested timeout in seconds; non-positive selects the daemon default.
    #[serde(default)]
    pub timeout: i32,
}

/// What happened to a call. Drives all downstream status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyOutcome {
    Success,
    NonZeroExit,
    Timeout,
    SpawnFailure,
    Rejected { violation: ViolationKind },
    /// The daemon could not decode or accept the call frame.
    Invalid,
}

/// Reply to an [`ExecuteCall`]. `success` is true only when the process ran to an exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteReply {
    pub id: String,
    pub success: bool,
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub execution_time: String,
    #[serde(default)]
    pub error_message: String,
    pub outcome: ReplyOutcome,
}

impl ExecuteReply {
    /// Reply for a call that never reached validation.
    pub fn invalid(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            execution_time: String::new(),
            error_message: message.into(),
            outcome: ReplyOutcome::Invalid,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("socket i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {len} bytes exceeds limit of {limit} bytes")]
    TooLarge { len: usize, limit: usize },
    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Write `msg` as one frame. Refuses to send a frame larger than `limit`.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T, limit: usize) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = serde_json::to_vec(msg)?;
    if data.len() > limit {
        return Err(FrameError::TooLarge {
            len: data.len(),
            limit,
        });
    }
    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. Returns `Ok(None)` when the peer closed cleanly before a new frame began.
pub async fn read_frame<R, T>(reader: &mut R, limit: usize) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > limit {
        return Err(FrameError::TooLarge { len, limit });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(serde_json::from_slice(&buf)?))
}
