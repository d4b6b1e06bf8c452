//! Lambda Debugger - local invoke-and-debug loop for JavaScript handlers
//!
//! `serve` runs the invocation endpoint in the foreground; `start`/`stop`/
//! `status`/`restart` manage it as a background daemon, and `invoke` posts to
//! the running daemon.

mod client;
mod config;
mod router;
mod supervisor;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::DaemonClient;
use crate::config::Config;
use crate::supervisor::{format_uptime, tail_log, DaemonStatus, Supervisor};
use lambda_debugger_runtime::InvokerState;

#[derive(Parser, Debug)]
#[command(name = "lambda-debugger")]
#[command(about = "Invoke and debug local JavaScript Lambda handlers", long_about = None)]
#[command(after_help = "Examples:\n  \
    lambda-debugger start\n  \
    lambda-debugger status\n  \
    lambda-debugger invoke /home/user/handler.js:main '{\"key\":\"value\"}'\n  \
    lambda-debugger stop")]
struct Cli {
    /// Configuration file (toml, yaml or json)
    #[arg(long, global = true, env = "LAMBDA_DEBUGGER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LAMBDA_DEBUGGER_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the invocation endpoint in the foreground
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Directory with the static UI served at /
        #[arg(long)]
        ui_dir: Option<PathBuf>,
    },

    /// Start the daemon in the background
    Start {
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Stop the daemon
    Stop,

    /// Show daemon status
    Status,

    /// Restart the daemon
    Restart {
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Invoke a handler through the running daemon
    Invoke {
        /// Handler spec: /absolute/path/handler.js:exportName
        handler_path: String,

        /// Event as a JSON string (defaults to {})
        event: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show log file locations and recent output
    Logs {
        /// Number of lines to print from the output log
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let serving = matches!(cli.command, Commands::Serve { .. });
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| if serving { "info" } else { "warn" }.to_string());

    // Initialize tracing; client commands keep stdout for their own output
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("lambda_debugger={level},lambda_debugger_runtime={level},handler={level},tower_http={level}").into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if serving {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("✗ {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load(cli.config.as_deref())?;
    let serve_args = forwarded_args(&cli)?;

    match cli.command {
        Commands::Serve { port, host, ui_dir } => {
            serve(config, port, host, ui_dir).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Start { port } => {
            let supervisor = Supervisor::from_config(&config.daemon)?;
            let record = supervisor
                .start(port.unwrap_or(config.server.port), &serve_args)
                .await?;

            println!("✓ Lambda Debugger daemon started (PID: {})", record.pid);
            println!("  UI: http://localhost:{}", record.port);
            println!("  API: POST http://localhost:{}/invoke", record.port);
            println!("  Logs: {}", supervisor.paths().out_log.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stop => {
            Supervisor::from_config(&config.daemon)?.stop().await?;
            println!("✓ Lambda Debugger daemon stopped");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            match Supervisor::from_config(&config.daemon)?.status()? {
                DaemonStatus::Running(record) => {
                    println!("✓ Lambda Debugger is running (PID: {})", record.pid);
                    println!("  Status: online");
                    println!("  URL: http://localhost:{}", record.port);
                    println!("  Uptime: {}", format_uptime(record.uptime()));
                }
                DaemonStatus::Stopped => println!("✗ Lambda Debugger daemon is not running"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Restart { port } => {
            let supervisor = Supervisor::from_config(&config.daemon)?;
            let record = supervisor
                .restart(port.unwrap_or(config.server.port), &serve_args)
                .await?;
            println!("✓ Lambda Debugger daemon restarted (PID: {})", record.pid);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Invoke {
            handler_path,
            event,
            port,
        } => invoke(&config, &handler_path, event.as_deref(), port).await,
        Commands::Logs { lines } => {
            let supervisor = Supervisor::from_config(&config.daemon)?;
            let paths = supervisor.paths();

            println!("Logs are stored at: {}", paths.out_log.display());
            println!("Errors are stored at: {}", paths.err_log.display());
            println!("Tail logs: tail -f {}", paths.out_log.display());

            let tail = tail_log(&paths.out_log, lines)
                .with_context(|| format!("reading {}", paths.out_log.display()))?;
            if !tail.is_empty() {
                println!();
                for line in tail {
                    println!("{line}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run the endpoint until SIGINT/SIGTERM
async fn serve(
    config: Config,
    port: Option<u16>,
    host: Option<String>,
    ui_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.server.port);
    let host = host.unwrap_or(config.server.host);
    let ui_dir = ui_dir.or(config.server.ui_dir);

    info!("Starting Lambda Debugger...");
    match &ui_dir {
        Some(dir) => info!("  UI: {}", dir.display()),
        None => info!("  UI: bundled"),
    }
    debug!(remaining_time_ms = config.runtime.remaining_time_ms, "Runtime options");

    let state = InvokerState::with_options(config.runtime);
    let app = router::create_router(state, ui_dir.as_deref(), config.server.body_limit_bytes);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Listening on http://{}", addr);
    info!("  API: POST http://{}/invoke", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Lambda Debugger stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}

async fn invoke(
    config: &Config,
    handler_path: &str,
    event: Option<&str>,
    port: Option<u16>,
) -> anyhow::Result<ExitCode> {
    // Reject bad input before touching the daemon
    let event: serde_json::Value =
        serde_json::from_str(event.unwrap_or("{}")).context("Invalid event JSON")?;

    let client = DaemonClient::local(port.unwrap_or(config.server.port))?;
    let response = client.invoke(handler_path, &event).await?;

    if response.success {
        println!("✓ Invocation successful");
        println!("{}", serde_json::to_string_pretty(&response.result)?);
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!(
        "✗ Invocation failed: {}",
        response.error.as_deref().unwrap_or("unknown error")
    );
    if let Some(error_type) = response.error_type {
        eprintln!("  Type: {error_type}");
    }
    if let Some(stack) = response.stack {
        eprintln!("{stack}");
    }
    Ok(ExitCode::FAILURE)
}

/// Global flags the background `serve` process should inherit
fn forwarded_args(cli: &Cli) -> anyhow::Result<Vec<OsString>> {
    let mut args = Vec::new();
    if let Some(path) = &cli.config {
        let path = std::path::absolute(path)
            .with_context(|| format!("resolving {}", path.display()))?;
        args.push("--config".into());
        args.push(path.into_os_string());
    }
    if let Some(level) = &cli.log_level {
        args.push("--log-level".into());
        args.push(level.into());
    }
    Ok(args)
}
