//! Gateway: HTTP front end for the execution daemon.
//!
//! Accepts execute requests, forwards them over the bridge, and maps each reply outcome to
//! an HTTP status and body. Holds no privilege of its own.

mod error;
mod protocol;
mod server;

pub use error::GatewayError;
pub use protocol::{
    map_bridge_error, map_reply, parse_execute_request, CommandsResponse, ExecuteBody,
    ExecuteRequest, ExecuteResponse, RequestLimits,
};
pub use server::{router, run_gateway, GatewayState, RPC_DEADLINE_SLACK};
