//! Audit events emitted by the execution daemon.
//!
//! Each event is one JSON line logged under [`AUDIT_TARGET`]; the logger installed by the
//! binary decides level filtering and destination.

use serde::Serialize;

use crate::exec::{format_duration, ExecutionResult};
use crate::policy::{Violation, ViolationKind};

pub const AUDIT_TARGET: &str = "cmdrelay::audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    CommandRequest,
    CommandRejected,
    CommandExecuted,
    CommandCancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent<'a> {
    pub timestamp: String,
    pub mode: &'static str,
    pub event: AuditKind,
    pub request_id: &'a str,
    pub command: &'a str,
    pub args: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<ViolationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> AuditEvent<'a> {
    fn new(event: AuditKind, request_id: &'a str, command: &'a str, args: &'a [String]) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            mode: "daemon",
            event,
            request_id,
            command,
            args,
            exit_code: None,
            outcome: None,
            violation: None,
            execution_time: None,
            error: None,
        }
    }

    pub fn request(request_id: &'a str, command: &'a str, args: &'a [String]) -> Self {
        Self::new(AuditKind::CommandRequest, request_id, command, args)
    }

    pub fn rejected(
        request_id: &'a str,
        command: &'a str,
        args: &'a [String],
        violation: &Violation,
    ) -> Self {
        let mut e = Self::new(AuditKind::CommandRejected, request_id, command, args);
        e.violation = Some(violation.kind);
        e.error = Some(violation.to_string());
        e
    }

    pub fn executed(
        request_id: &'a str,
        command: &'a str,
        args: &'a [String],
        result: &ExecutionResult,
    ) -> Self {
        let mut e = Self::new(AuditKind::CommandExecuted, request_id, command, args);
        e.exit_code = Some(result.exit_code);
        e.outcome = Some(result.outcome.as_str());
        e.execution_time = Some(format_duration(result.duration));
        e.error = result.error.clone();
        e
    }

    pub fn cancelled(request_id: &'a str, command: &'a str, args: &'a [String]) -> Self {
        let mut e = Self::new(AuditKind::CommandCancelled, request_id, command, args);
        e.error = Some("caller disconnected before completion".to_string());
        e
    }

    fn level(&self) -> log::Level {
        match self.event {
            AuditKind::CommandRequest => log::Level::Debug,
            AuditKind::CommandRejected | AuditKind::CommandCancelled => log::Level::Warn,
            AuditKind::CommandExecuted if self.error.is_some() => log::Level::Warn,
            AuditKind::CommandExecuted => log::Level::Info,
        }
    }

    /// Serialize and log this event.
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(line) => log::log!(target: AUDIT_TARGET, self.level(), "{}", line),
            Err(e) => log::warn!("failed to serialize audit event: {}", e),
        }
    }
}
