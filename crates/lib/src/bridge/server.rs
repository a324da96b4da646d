//! Execution daemon: owns the catalog, binds the socket, validates and runs calls.

use anyhow::{Context, Result};
use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinSet;

use crate::audit::AuditEvent;
use crate::bridge::protocol::{
    read_frame, write_frame, ExecuteCall, ExecuteReply, FrameError, ReplyOutcome,
    MAX_REQUEST_FRAME, MAX_RESPONSE_FRAME,
};
use crate::catalog::CommandCatalog;
use crate::config::{self, Config};
use crate::exec::{format_duration, Executor, OutcomeKind};
use crate::policy;

/// Validates and executes calls against an immutable catalog.
pub struct DaemonService {
    catalog: Arc<CommandCatalog>,
    executor: Executor,
}

impl DaemonService {
    pub fn new(catalog: Arc<CommandCatalog>, executor: Executor) -> Self {
        Self { catalog, executor }
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    /// Validate then (if accepted) execute one call. Never fails: every case is a reply.
    pub async fn handle(&self, call: &ExecuteCall) -> ExecuteReply {
        AuditEvent::request(&call.id, &call.command, &call.args).emit();

        if let Err(violation) = policy::validate(&call.command, &call.args, &self.catalog) {
            AuditEvent::rejected(&call.id, &call.command, &call.args, &violation).emit();
            return ExecuteReply {
                id: call.id.clone(),
                success: false,
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                execution_time: String::new(),
                error_message: violation.to_string(),
                outcome: ReplyOutcome::Rejected {
                    violation: violation.kind,
                },
            };
        }

        let result = self
            .executor
            .execute(&call.command, &call.args, i64::from(call.timeout))
            .await;
        AuditEvent::executed(&call.id, &call.command, &call.args, &result).emit();

        // Spawn/OS detail stays in the audit log; only the classification crosses the socket.
        let (outcome, error_message) = match result.outcome {
            OutcomeKind::Success => (ReplyOutcome::Success, String::new()),
            OutcomeKind::NonZeroExit => (ReplyOutcome::NonZeroExit, String::new()),
            OutcomeKind::Timeout => (
                ReplyOutcome::Timeout,
                "command execution timed out".to_string(),
            ),
            OutcomeKind::SpawnFailure => (
                ReplyOutcome::SpawnFailure,
                "command execution failed".to_string(),
            ),
        };
        ExecuteReply {
            id: call.id.clone(),
            success: result.outcome.ran_to_exit(),
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
            execution_time: format_duration(result.duration),
            error_message,
            outcome,
        }
    }
}

/// Bind the daemon socket at `path`: remove whatever is there, bind, then apply `mode`.
pub fn bind_socket(path: &Path, mode: u32) -> Result<UnixListener> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating socket directory {}", parent.display()))?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => log::info!("removed stale socket at {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("removing existing socket {}", path.display()))
        }
    }
    let listener =
        UnixListener::bind(path).with_context(|| format!("binding socket {}", path.display()))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("setting permissions {:o} on {}", mode, path.display()))?;
    Ok(listener)
}

/// Accept connections until `shutdown` resolves, then give in-flight calls up to `grace`
/// to finish before aborting them. Aborted calls kill their child processes.
pub async fn serve<F>(
    listener: UnixListener,
    service: Arc<DaemonService>,
    shutdown: F,
    grace: Duration,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let service = service.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, &service).await {
                            log::debug!("bridge connection ended with error: {}", e);
                        }
                    });
                }
                Err(e) => pause_after_accept_error(&e).await,
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    log::warn!("bridge connection task failed: {}", e);
                }
            }
        }
    }
    drop(listener);

    if !connections.is_empty() {
        log::info!(
            "waiting up to {:?} for {} in-flight connection(s)",
            grace,
            connections.len()
        );
    }
    let drained = tokio::time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        log::warn!(
            "grace period elapsed; aborting {} connection(s)",
            connections.len()
        );
        connections.shutdown().await;
    }
    Ok(())
}

/// Delay before the next accept after a failure (e.g. EMFILE), so a persistent error does
/// not spin the accept loop.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

async fn pause_after_accept_error(e: &std::io::Error) {
    log::warn!(
        "accept on daemon socket failed: {}; retrying in {:?}",
        e,
        ACCEPT_RETRY_DELAY
    );
    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
}

/// Serve sequential calls on one connection until the peer closes it.
///
/// Callers must keep their write half open until the reply arrives: EOF while a call is
/// running is read as a disconnect and cancels the call.
async fn handle_connection(stream: UnixStream, service: &DaemonService) -> Result<(), FrameError> {
    let (mut reader, mut writer) = stream.into_split();
    loop {
        let call: ExecuteCall = match read_frame(&mut reader, MAX_REQUEST_FRAME).await {
            Ok(Some(call)) => call,
            Ok(None) => return Ok(()),
            Err(FrameError::TooLarge { len, limit }) => {
                log::warn!("refusing {} byte call frame (limit {})", len, limit);
                let reply = ExecuteReply::invalid("", "request exceeds maximum message size");
                write_frame(&mut writer, &reply, MAX_RESPONSE_FRAME).await?;
                return Ok(());
            }
            Err(FrameError::Decode(e)) => {
                log::warn!("undecodable call frame: {}", e);
                let reply = ExecuteReply::invalid("", "malformed request");
                write_frame(&mut writer, &reply, MAX_RESPONSE_FRAME).await?;
                continue;
            }
            Err(e) => return Err(e),
        };

        let reply = tokio::select! {
            reply = service.handle(&call) => reply,
            _ = peer_gone(&mut reader) => {
                AuditEvent::cancelled(&call.id, &call.command, &call.args).emit();
                return Ok(());
            }
        };
        if let Err(e) = write_frame(&mut writer, &reply, MAX_RESPONSE_FRAME).await {
            if let FrameError::TooLarge { len, limit } = e {
                log::warn!("reply of {} bytes exceeds limit {}; sending failure", len, limit);
                let fallback = ExecuteReply {
                    stdout: String::new(),
                    stderr: String::new(),
                    success: false,
                    error_message: "command output exceeds maximum message size".to_string(),
                    outcome: ReplyOutcome::SpawnFailure,
                    ..reply
                };
                write_frame(&mut writer, &fallback, MAX_RESPONSE_FRAME).await?;
            } else {
                return Err(e);
            }
        }
    }
}

/// Resolves when the peer closes its end (or sends data it should not while a call runs).
async fn peer_gone(reader: &mut OwnedReadHalf) {
    let mut byte = [0u8; 1];
    match reader.read(&mut byte).await {
        Ok(0) => log::debug!("caller closed the connection during execution"),
        Ok(_) => log::warn!("caller sent data while a call was in flight; dropping connection"),
        Err(e) => log::debug!("caller connection failed during execution: {}", e),
    }
}

/// Run the execution daemon until SIGINT/SIGTERM. Env/flag overrides are applied by the caller.
pub async fn run_daemon(config: Config) -> Result<()> {
    run_daemon_until(config, crate::signal::shutdown_signal()).await
}

/// Run the execution daemon until `shutdown` resolves. Binds `config.socket.path` (fatal on
/// failure), serves, drains in-flight calls for the grace period, then removes the socket file.
pub async fn run_daemon_until<F>(config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let catalog = config::load_catalog(&config)?;
    let mode = config::parse_socket_mode(&config.socket.permissions)?;
    let socket_path: PathBuf = config.socket.path.clone();
    let limits = config.daemon.limits();
    let grace = config.daemon.shutdown_grace();

    let listener = bind_socket(&socket_path, mode)?;
    log::info!(
        "daemon listening on {} (mode {:o}, {} command(s), max execution {:?})",
        socket_path.display(),
        mode,
        catalog.len(),
        limits.max_execution_time
    );

    let service = Arc::new(DaemonService::new(Arc::new(catalog), Executor::new(limits)));
    let served = serve(listener, service, shutdown, grace).await;

    match std::fs::remove_file(&socket_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("removing socket {}: {}", socket_path.display(), e),
    }
    log::info!("daemon stopped");
    served
}
