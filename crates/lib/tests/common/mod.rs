//! Shared fixtures: a real daemon on a temporary socket.

#![allow(dead_code)]

use cmdrelay::bridge::{bind_socket, serve, DaemonService};
use cmdrelay::catalog::{CommandCatalog, CommandSpec};
use cmdrelay::exec::{ExecutionLimits, Executor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct TestDaemon {
    pub dir: PathBuf,
    pub socket: PathBuf,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestDaemon {
    /// Signal shutdown and wait for the serve loop to return.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        let joined = tokio::time::timeout(Duration::from_secs(5), &mut self.handle).await;
        assert!(joined.is_ok(), "daemon did not stop within 5s");
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        self.handle.abort();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

pub fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cmdrelay-{}-{}", label, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn sample_commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("echo", "print arguments", &["hello", "world"]),
        CommandSpec::new("false", "always fails", &[]),
        CommandSpec::new("sleep", "wait", &["5"]),
        CommandSpec::new("ls", "list files", &["-l", "-a"]),
        CommandSpec::new(
            "cmdrelay-missing-binary-7f3a",
            "not installed anywhere",
            &[],
        ),
    ]
}

pub fn start_daemon(commands: Vec<CommandSpec>, limits: ExecutionLimits) -> TestDaemon {
    start_daemon_with_grace(commands, limits, Duration::from_secs(1))
}

pub fn start_daemon_with_grace(
    commands: Vec<CommandSpec>,
    limits: ExecutionLimits,
    grace: Duration,
) -> TestDaemon {
    let dir = temp_dir("daemon");
    let socket = dir.join("d.sock");
    let listener = bind_socket(&socket, 0o600).expect("bind daemon socket");
    let catalog = CommandCatalog::new(commands).expect("valid catalog");
    let service = Arc::new(DaemonService::new(Arc::new(catalog), Executor::new(limits)));
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(serve(
        listener,
        service,
        async move {
            let _ = rx.await;
        },
        grace,
    ));
    TestDaemon {
        dir,
        socket,
        stop: Some(tx),
        handle,
    }
}

pub fn limits(max_secs: u64) -> ExecutionLimits {
    ExecutionLimits {
        default_timeout: Duration::from_secs(max_secs.min(30)),
        max_execution_time: Duration::from_secs(max_secs),
    }
}
