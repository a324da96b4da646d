//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.cmdrelay/config.json`) and environment. Files
//! ending in `.yaml`/`.yml` are read as YAML with the same keys. The daemon and the gateway
//! read the same file; each uses its own section plus the shared socket and command list.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::MAX_REQUEST_FRAME;
use crate::catalog::{CommandCatalog, CommandSpec};
use crate::exec::ExecutionLimits;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Daemon socket location and permissions.
    #[serde(default)]
    pub socket: SocketConfig,

    /// Execution daemon limits.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// The command catalog: permitted commands and their permitted arguments.
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

/// Where the daemon socket lives and who may open it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketConfig {
    /// Socket file path (default "/var/run/cmdrelay.sock"). Overridden by CMDRELAY_SOCKET env.
    #[serde(default = "default_socket_path")]
    pub path: PathBuf,

    /// Octal permission bits applied right after bind (default "0660").
    #[serde(default = "default_socket_permissions")]
    pub permissions: String,
}

/// Execution daemon limits, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    /// Ceiling applied to every requested timeout (default 300).
    #[serde(default = "default_max_execution_time")]
    pub max_execution_time: i64,

    /// Timeout used when a call carries none (default 30).
    #[serde(default = "default_timeout")]
    pub default_timeout: i64,

    /// How long in-flight calls may run after a shutdown signal (default 10).
    #[serde(default = "default_shutdown_grace_period")]
    pub shutdown_grace_period: i64,
}

/// Gateway bind, port, and request-shape limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// HTTP port (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Largest accepted request body in bytes (default 1 MiB, capped at the bridge's 1 MiB
    /// request frame).
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Timeout applied when a request omits one or sends a non-positive value (default 30).
    #[serde(default = "default_timeout")]
    pub default_timeout: i64,

    /// Requests asking for more than this many seconds are rejected (default 300).
    /// Independent of `daemon.maxExecutionTime`.
    #[serde(default = "default_max_execution_time")]
    pub max_request_timeout: i64,

    /// Deadline for the readiness probe in milliseconds (default 1000).
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/var/run/cmdrelay.sock")
}

fn default_socket_permissions() -> String {
    "0660".to_string()
}

fn default_max_execution_time() -> i64 {
    300
}

fn default_timeout() -> i64 {
    30
}

fn default_shutdown_grace_period() -> i64 {
    10
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

fn default_ready_timeout_ms() -> u64 {
    1000
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            path: default_socket_path(),
            permissions: default_socket_permissions(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_execution_time: default_max_execution_time(),
            default_timeout: default_timeout(),
            shutdown_grace_period: default_shutdown_grace_period(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            max_body_size: default_max_body_size(),
            default_timeout: default_timeout(),
            max_request_timeout: default_max_execution_time(),
            ready_timeout_ms: default_ready_timeout_ms(),
        }
    }
}

/// Non-positive values fall back to `fallback`.
fn positive_or(value: i64, fallback: i64) -> u64 {
    if value > 0 {
        value as u64
    } else {
        fallback as u64
    }
}

impl DaemonConfig {
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            default_timeout: Duration::from_secs(positive_or(self.default_timeout, default_timeout())),
            max_execution_time: Duration::from_secs(positive_or(
                self.max_execution_time,
                default_max_execution_time(),
            )),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(positive_or(
            self.shutdown_grace_period,
            default_shutdown_grace_period(),
        ))
    }
}

impl GatewayConfig {
    pub fn effective_default_timeout(&self) -> i64 {
        positive_or(self.default_timeout, default_timeout()) as i64
    }

    pub fn effective_max_request_timeout(&self) -> i64 {
        positive_or(self.max_request_timeout, default_max_execution_time()) as i64
    }

    /// HTTP body ceiling, never above the bridge's request frame ceiling.
    pub fn effective_max_body_size(&self) -> usize {
        let configured = if self.max_body_size == 0 {
            default_max_body_size()
        } else {
            self.max_body_size
        };
        configured.min(MAX_REQUEST_FRAME)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(if self.ready_timeout_ms == 0 {
            default_ready_timeout_ms()
        } else {
            self.ready_timeout_ms
        })
    }
}

/// Parse octal permission bits such as "0660", "660" or "0o660". Values above 0777 are refused.
pub fn parse_socket_mode(s: &str) -> Result<u32> {
    let t = s.trim();
    let digits = t.strip_prefix("0o").unwrap_or(t);
    let mode = u32::from_str_radix(digits, 8)
        .with_context(|| format!("invalid socket permissions {:?} (expected octal, e.g. \"0660\")", s))?;
    if mode > 0o777 {
        anyhow::bail!("socket permissions {:?} exceed 0777", s);
    }
    Ok(mode)
}

/// True if the gateway bind address is loopback-only.
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve the socket path: env CMDRELAY_SOCKET overrides config.
pub fn resolve_socket_path(config: &Config) -> PathBuf {
    std::env::var("CMDRELAY_SOCKET")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| config.socket.path.clone())
}

/// Build the daemon's catalog from config. Invalid or empty catalogs are fatal at startup.
pub fn load_catalog(config: &Config) -> Result<CommandCatalog> {
    let catalog =
        CommandCatalog::new(config.commands.clone()).context("invalid command catalog")?;
    if catalog.is_empty() {
        anyhow::bail!("no commands defined in configuration");
    }
    Ok(catalog)
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CMDRELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".cmdrelay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Parse config text; `path` only selects the format.
pub fn parse_config(path: &Path, text: &str) -> Result<Config> {
    if is_yaml(path) {
        serde_yaml::from_str(text).with_context(|| format!("parsing config from {}", path.display()))
    } else {
        serde_json::from_str(text).with_context(|| format!("parsing config from {}", path.display()))
    }
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        parse_config(&path, &s)?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.socket.path, PathBuf::from("/var/run/cmdrelay.sock"));
        assert_eq!(c.socket.permissions, "0660");
        assert_eq!(c.daemon.max_execution_time, 300);
        assert_eq!(c.daemon.default_timeout, 30);
        assert_eq!(c.gateway.port, 8080);
        assert_eq!(c.gateway.bind, "127.0.0.1");
        assert_eq!(c.gateway.max_request_timeout, 300);
        assert!(c.commands.is_empty());
    }

    #[test]
    fn socket_mode_parses_octal() {
        assert_eq!(parse_socket_mode("0660").unwrap(), 0o660);
        assert_eq!(parse_socket_mode("600").unwrap(), 0o600);
        assert_eq!(parse_socket_mode("0o770").unwrap(), 0o770);
        assert!(parse_socket_mode("0988").is_err());
        assert!(parse_socket_mode("1777").is_err());
        assert!(parse_socket_mode("").is_err());
    }

    #[test]
    fn body_limit_is_capped_by_request_frame() {
        let mut g = GatewayConfig::default();
        assert_eq!(g.effective_max_body_size(), 1024 * 1024);
        g.max_body_size = 4 * 1024 * 1024;
        assert_eq!(g.effective_max_body_size(), MAX_REQUEST_FRAME);
        g.max_body_size = 4096;
        assert_eq!(g.effective_max_body_size(), 4096);
        g.max_body_size = 0;
        assert_eq!(g.effective_max_body_size(), 1024 * 1024);
    }

    #[test]
    fn loopback_binds_are_recognised() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind(" localhost "));
        assert!(is_loopback_bind("::1"));
        assert!(!is_loopback_bind("0.0.0.0"));
    }

    #[test]
    fn non_positive_limits_fall_back() {
        let d = DaemonConfig {
            max_execution_time: 0,
            default_timeout: -5,
            shutdown_grace_period: 0,
        };
        let limits = d.limits();
        assert_eq!(limits.max_execution_time, Duration::from_secs(300));
        assert_eq!(limits.default_timeout, Duration::from_secs(30));
        assert_eq!(d.shutdown_grace(), Duration::from_secs(10));
    }

    #[test]
    fn json_config_parses_with_partial_sections() {
        let text = r#"{
            "socket": { "path": "/tmp/x.sock" },
            "daemon": { "maxExecutionTime": 5 },
            "commands": [
                { "name": "ls", "description": "list", "allowedArgs": ["-l", "-a"] },
                { "name": "uptime" }
            ]
        }"#;
        let c = parse_config(Path::new("config.json"), text).unwrap();
        assert_eq!(c.socket.path, PathBuf::from("/tmp/x.sock"));
        assert_eq!(c.socket.permissions, "0660");
        assert_eq!(c.daemon.max_execution_time, 5);
        assert_eq!(c.daemon.default_timeout, 30);
        assert_eq!(c.commands.len(), 2);
        assert_eq!(c.commands[0].allowed_args, vec!["-l", "-a"]);
    }

    #[test]
    fn yaml_config_parses_by_extension() {
        let text = "gateway:\n  port: 9090\ncommands:\n  - name: df\n    allowedArgs: [\"-h\"]\n";
        let c = parse_config(Path::new("/etc/cmdrelay/config.yaml"), text).unwrap();
        assert_eq!(c.gateway.port, 9090);
        assert_eq!(c.commands[0].name, "df");
        assert_eq!(c.commands[0].allowed_args, vec!["-h"]);
    }

    #[test]
    fn unknown_command_fields_are_rejected() {
        let text = r#"{ "commands": [ { "name": "ls", "allowed_args": ["-l"] } ] }"#;
        assert!(parse_config(Path::new("c.json"), text).is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!("cmdrelay-missing-{}.json", uuid::Uuid::new_v4()));
        let (c, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert!(c.commands.is_empty());
    }
}
