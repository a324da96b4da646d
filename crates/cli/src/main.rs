use clap::{Parser, Subcommand};
use cmdrelay::bridge::{new_call_id, DaemonClient, ExecuteCall, ExecutionBackend, ReplyOutcome};
use cmdrelay::config::{self, Config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cmdrelay")]
#[command(about = "Privilege-separated command relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration file with bundled defaults (socket, limits, example catalog).
    Init {
        /// Config file path (default: CMDRELAY_CONFIG_PATH or ~/.cmdrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the execution daemon: validate calls against the catalog and spawn them.
    Daemon {
        /// Config file path (default: CMDRELAY_CONFIG_PATH or ~/.cmdrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Socket path (default: CMDRELAY_SOCKET or socket.path from config)
        #[arg(long, short, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Run the HTTP gateway that forwards execute requests to the daemon.
    Gateway {
        /// Config file path (default: CMDRELAY_CONFIG_PATH or ~/.cmdrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,

        /// Socket path (default: CMDRELAY_SOCKET or socket.path from config)
        #[arg(long, short, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Issue one execute call straight to the daemon and print the reply.
    Exec {
        /// Config file path (default: CMDRELAY_CONFIG_PATH or ~/.cmdrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Socket path (default: CMDRELAY_SOCKET or socket.path from config)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,

        /// Timeout in seconds (default: the daemon's default)
        #[arg(long)]
        timeout: Option<i32>,

        /// Print the configured catalog instead of executing.
        #[arg(long)]
        list: bool,

        /// Command name from the catalog.
        command: Option<String>,

        /// Arguments, each of which must be allowed for the command.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("cmdrelay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Daemon { config, socket }) => {
            if let Err(e) = run_daemon(config, socket).await {
                log::error!("daemon failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway {
            config,
            port,
            socket,
        }) => {
            if let Err(e) = run_gateway(config, port, socket).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Exec {
            config,
            socket,
            timeout,
            list,
            command,
            args,
        }) => match run_exec(config, socket, timeout, list, command, args).await {
            Ok(code) => std::process::exit(code),
            Err(e) => {
                log::error!("exec failed: {:#}", e);
                std::process::exit(1);
            }
        },
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// Load config and apply the socket override order: flag, then env, then file.
fn load(
    config_path: Option<PathBuf>,
    socket: Option<PathBuf>,
) -> anyhow::Result<(Config, PathBuf)> {
    let (mut config, path) = config::load_config(config_path)?;
    config.socket.path = socket.unwrap_or_else(|| config::resolve_socket_path(&config));
    Ok((config, path))
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let dir = cmdrelay::init::init_config(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_daemon(config_path: Option<PathBuf>, socket: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = load(config_path, socket)?;
    cmdrelay::init::require_initialized(&path)?;
    log::info!(
        "starting daemon on {} ({} commands)",
        config.socket.path.display(),
        config.commands.len()
    );
    cmdrelay::bridge::run_daemon(config).await
}

async fn run_gateway(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    socket: Option<PathBuf>,
) -> anyhow::Result<()> {
    let (mut config, _path) = load(config_path, socket)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    cmdrelay::gateway::run_gateway(config).await
}

/// Returns the process exit code: the command's own on a completed run, 1 otherwise.
async fn run_exec(
    config_path: Option<PathBuf>,
    socket: Option<PathBuf>,
    timeout: Option<i32>,
    list: bool,
    command: Option<String>,
    args: Vec<String>,
) -> anyhow::Result<i32> {
    let (config, _path) = load(config_path, socket)?;

    if list {
        let catalog = config::load_catalog(&config)?;
        println!("{}", serde_json::to_string_pretty(&catalog.listing())?);
        return Ok(0);
    }

    let Some(command) = command else {
        anyhow::bail!("command is not specified");
    };
    let requested = timeout.unwrap_or(0);
    let deadline = config.daemon.limits().effective_timeout(i64::from(requested))
        + cmdrelay::gateway::RPC_DEADLINE_SLACK;
    let call = ExecuteCall {
        id: new_call_id(),
        command,
        args,
        timeout: requested,
    };

    let client = DaemonClient::new(config.socket.path.clone());
    let reply = client.execute(call, deadline).await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);

    Ok(match reply.outcome {
        ReplyOutcome::Success | ReplyOutcome::NonZeroExit => reply.exit_code,
        _ => 1,
    })
}
