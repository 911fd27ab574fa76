//! tws-host: workspace host process.
//!
//! Serves a sandboxed project directory and multiplexed PTY/tmux terminals
//! to UI surfaces, over stdio (one surface, spawned by the desktop shell)
//! or WebSocket (any number of surfaces).

mod command;
mod config;
mod dialog;
mod host;
mod session;
mod tmux;
mod transport;
mod workspace;

use clap::Parser;
use command::{CommandRunner, SystemRunner};
use config::{CliOverrides, HostConfig};
use host::Host;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use transport::stdio::StreamChannel;
use transport::{next_surface_id, serve_surface, websocket};

/// Depth of the transport -> host queue.
const INBOUND_QUEUE: usize = 256;

/// tws-host command line
#[derive(Parser, Debug)]
#[command(name = "tws-host", version, about = "Workspace file and terminal host")]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "~/.tws/config.toml")]
    config: String,

    /// WebSocket listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// WebSocket bind address
    #[arg(long)]
    bind: Option<String>,

    /// Directory to open at startup
    #[arg(short, long)]
    directory: Option<String>,

    /// Serve a single surface over stdin/stdout instead of WebSocket
    #[arg(long)]
    stdio: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing; stdout carries frames in stdio mode.
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    if cli.stdio {
        subscriber.with_writer(std::io::stderr).init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), stdio = cli.stdio, "starting tws-host");

    let config_path = PathBuf::from(&cli.config);
    let config = match HostConfig::load(
        Some(&config_path),
        CliOverrides {
            bind: cli.bind,
            port: cli.port,
            directory: cli.directory,
            stdio: cli.stdio,
        },
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let (host, channels) = Host::new(&config, runner);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);

    if config.stdio {
        let surface = next_surface_id();
        tokio::spawn(async move {
            if let Err(e) = serve_surface(surface, StreamChannel::stdio(), inbound_tx).await {
                warn!(error = %e, "stdio surface error");
            }
        });
    } else {
        let addr = match config.bind.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, config.port),
            Err(e) => {
                error!(bind = %config.bind, port = config.port, error = %e, "invalid listen address");
                std::process::exit(1);
            }
        };
        match websocket::start_listener(addr).await {
            Ok((local_addr, connections)) => {
                info!(addr = %local_addr, "tws-host ready");
                tokio::spawn(websocket::accept_loop(connections, inbound_tx));
            }
            Err(e) => {
                error!(error = %e, "failed to start WebSocket listener");
                std::process::exit(1);
            }
        }
    }

    host.run(inbound_rx, channels, shutdown_signal()).await;

    info!("tws-host stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
