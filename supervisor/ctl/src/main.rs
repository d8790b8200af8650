//! supervisor-ctl - Command-line control for supervisord
//!
//! Thin command layer over `supervisor-core`: every subcommand maps onto one or
//! two typed client operations and prints the decoded records.
//!
//! # Usage
//!
//! ```bash
//! # Daemon state via the default target (http://localhost:9001/RPC2)
//! supervisor-ctl state
//!
//! # All processes over the local socket, as JSON
//! supervisor-ctl --url unix:///var/run/supervisor.sock --json status
//!
//! # Start everything without waiting
//! supervisor-ctl start --all --no-wait
//!
//! # Last 4 KiB of a process's stderr
//! supervisor-ctl tail worker --stderr --bytes 4096
//!
//! # Verbose logging
//! RUST_LOG=debug supervisor-ctl state
//! ```

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, warn};

use supervisor_core::{default_config_path, load_config_from_path, SupervisorClient};

/// supervisor-ctl - Control a running supervisord
#[derive(Parser, Debug)]
#[command(name = "supervisor-ctl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Connect target (http://host:port/path or unix:///path/to.sock[/path])
    #[arg(short = 'u', long, env = "SUPERVISOR_URL", value_name = "URL")]
    url: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "SUPERVISOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Dial timeout in milliseconds (0 = none)
    #[arg(long, value_name = "MS")]
    connect_timeout: Option<u64>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SUPERVISOR_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show API, daemon and identification versions
    Version,

    /// Show the daemon state
    State,

    /// Show one process, or all of them
    Status {
        /// Process name (`group:name` for grouped processes)
        name: Option<String>,
    },

    /// Start a process, or every process with --all
    Start {
        /// Process name
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,

        /// Start every process
        #[arg(long)]
        all: bool,

        /// Return without waiting for the process to be running
        #[arg(long)]
        no_wait: bool,
    },

    /// Stop a process, or every process with --all
    Stop {
        /// Process name
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,

        /// Stop every process
        #[arg(long)]
        all: bool,

        /// Return without waiting for the process to exit
        #[arg(long)]
        no_wait: bool,
    },

    /// Start every process in a group
    StartGroup {
        /// Group name
        group: String,

        /// Return without waiting
        #[arg(long)]
        no_wait: bool,
    },

    /// Stop every process in a group
    StopGroup {
        /// Group name
        group: String,

        /// Return without waiting
        #[arg(long)]
        no_wait: bool,
    },

    /// Show the end of a process log
    Tail {
        /// Process name
        name: String,

        /// Read stderr instead of stdout
        #[arg(long)]
        stderr: bool,

        /// Number of bytes to show
        #[arg(
            short = 'b',
            long,
            default_value_t = 1600,
            value_parser = clap::value_parser!(i64).range(1..)
        )]
        bytes: i64,
    },

    /// Show the end of the daemon log
    Log {
        /// Number of bytes to show
        #[arg(
            short = 'b',
            long,
            default_value_t = 1600,
            value_parser = clap::value_parser!(i64).range(1..)
        )]
        bytes: i64,
    },

    /// Reload the configuration and list changed process groups
    Reload,

    /// Clear both logs of a process
    Clear {
        /// Process name
        name: String,
    },

    /// Shut the daemon down
    Shutdown,

    /// Restart the daemon
    Restart,
}

/// Output of the `version` subcommand
#[derive(Debug, Serialize)]
struct VersionReport {
    api_version: String,
    supervisor_version: String,
    identification: String,
}

impl fmt::Display for VersionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "api {} / supervisord {} ({})",
            self.api_version, self.supervisor_version, self.identification
        )
    }
}

/// Result of a boolean control call
#[derive(Debug, Serialize)]
struct Outcome<'a> {
    action: &'a str,
    target: &'a str,
    ok: bool,
}

impl fmt::Display for Outcome<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.ok { "ok" } else { "failed" };
        write!(f, "{} {}: {verdict}", self.action, self.target)
    }
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "supervisor_ctl={level},supervisor_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn emit<T: Serialize + fmt::Display>(json: bool, value: &T) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value}");
    }
    Ok(())
}

fn emit_all<T: Serialize + fmt::Display>(json: bool, values: &[T]) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(values)?);
    } else {
        for value in values {
            println!("{value}");
        }
    }
    Ok(())
}

fn emit_outcome(json: bool, action: &str, target: &str, ok: bool) -> Result<()> {
    emit(json, &Outcome { action, target, ok })
}

async fn run(client: &SupervisorClient, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Version => {
            let report = VersionReport {
                api_version: client.api_version().to_string(),
                supervisor_version: client.get_supervisor_version().await?,
                identification: client.get_identification().await?,
            };
            emit(json, &report)
        }

        Command::State => emit(json, &client.get_state().await?),

        Command::Status { name: Some(name) } => emit(json, &client.get_process_info(&name).await?),
        Command::Status { name: None } => emit_all(json, &client.get_all_process_info().await?),

        Command::Start { all: true, no_wait, .. } => {
            emit_all(json, &client.start_all_processes(!no_wait).await?)
        }
        Command::Start { name, no_wait, .. } => {
            let name = name.context("a process name or --all is required")?;
            let ok = client.start_process(&name, !no_wait).await?;
            emit_outcome(json, "start", &name, ok)
        }

        Command::Stop { all: true, no_wait, .. } => {
            emit_all(json, &client.stop_all_processes(!no_wait).await?)
        }
        Command::Stop { name, no_wait, .. } => {
            let name = name.context("a process name or --all is required")?;
            let ok = client.stop_process(&name, !no_wait).await?;
            emit_outcome(json, "stop", &name, ok)
        }

        Command::StartGroup { group, no_wait } => {
            let ok = client.start_process_group(&group, !no_wait).await?;
            emit_outcome(json, "start-group", &group, ok)
        }
        Command::StopGroup { group, no_wait } => {
            let ok = client.stop_process_group(&group, !no_wait).await?;
            emit_outcome(json, "stop-group", &group, ok)
        }

        Command::Tail {
            name,
            stderr,
            bytes,
        } => {
            let tail = if stderr {
                client.tail_process_stderr_log(&name, 0, bytes).await?
            } else {
                client.tail_process_stdout_log(&name, 0, bytes).await?
            };
            if json {
                emit(json, &tail)
            } else {
                print!("{}", tail.log);
                Ok(())
            }
        }

        Command::Log { bytes } => {
            let text = client.read_log(-bytes, 0).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&text)?);
            } else {
                print!("{text}");
            }
            Ok(())
        }

        Command::Reload => emit(json, &client.reload_config().await?),

        Command::Clear { name } => {
            let ok = client.clear_process_logs(&name).await?;
            emit_outcome(json, "clear", &name, ok)
        }

        Command::Shutdown => {
            let ok = client.shutdown().await?;
            emit_outcome(json, "shutdown", client.target(), ok)
        }
        Command::Restart => {
            let ok = client.restart().await?;
            emit_outcome(json, "restart", client.target(), ok)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;
    if let Some(url) = args.url {
        config.url = url;
    }
    if let Some(ms) = args.connect_timeout {
        config.connect_timeout_ms = ms;
    }
    config.validate()?;

    debug!(url = %config.url, "Connecting");
    let client = SupervisorClient::connect_with_config(&config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.url))?;

    let result = run(&client, args.command, args.json).await;

    if let Err(e) = client.close().await {
        warn!(error = %e, "Failed to close client");
    }

    result
}
