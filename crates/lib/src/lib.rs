//! cmdrelay core library: a privilege-separated command relay.
//!
//! An unprivileged HTTP gateway forwards execute requests over a Unix-socket bridge to an
//! execution daemon, which checks them against an allow-list catalog before spawning.

pub mod audit;
pub mod bridge;
pub mod catalog;
pub mod config;
pub mod exec;
pub mod gateway;
pub mod init;
pub mod policy;
pub mod signal;
