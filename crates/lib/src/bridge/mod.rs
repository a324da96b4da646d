//! Local RPC bridge between the gateway and the execution daemon.
//!
//! One call, `Execute`, carried as length-prefixed JSON over a Unix-domain socket. The
//! socket file and its permission bits are the access-control gate for the privilege
//! boundary: anything able to open it can issue execution requests.
//!
//! A caller keeps its write half open until the reply is read. The daemon watches for EOF
//! while a call runs and treats it as a disconnect: the call is cancelled and its child killed.

mod client;
mod protocol;
mod server;

pub use client::{new_call_id, BridgeError, DaemonClient, ExecutionBackend};
pub use protocol::{
    read_frame, write_frame, ExecuteCall, ExecuteReply, FrameError, ReplyOutcome,
    MAX_REQUEST_FRAME, MAX_RESPONSE_FRAME,
};
pub use server::{bind_socket, run_daemon, run_daemon_until, serve, DaemonService};
