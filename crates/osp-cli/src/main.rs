//! OSP CLI - run presentation receivers and fling URLs to them
//!
//! Receivers are found by instance name over mDNS unless `--addr` points at
//! one directly.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use config::CliConfig;

/// OSP - local-network presentation protocol
#[derive(Parser, Debug)]
#[command(name = "osp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a receiver that prints every URL it is asked to present
    Receive {
        /// Instance name to advertise (defaults to the config file's name)
        name: Option<String>,

        /// Bind address
        #[arg(short, long)]
        bind: Option<std::net::IpAddr>,

        /// Port number (0 for any)
        #[arg(short = 'P', long)]
        port: Option<u16>,

        /// DER certificate file
        #[arg(long, requires = "key")]
        cert: Option<PathBuf>,

        /// DER (PKCS#8) private key file
        #[arg(long, requires = "cert")]
        key: Option<PathBuf>,
    },

    /// List receivers on the local network
    Browse {
        /// Stop after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Print one JSON object per receiver
        #[arg(long)]
        json: bool,
    },

    /// Ask a receiver to present a URL
    Fling {
        /// Receiver instance name
        target: String,

        /// URL to present
        url: String,

        /// Skip discovery and dial this address
        #[arg(short, long)]
        addr: Option<SocketAddr>,
    },

    /// Ask a receiver which URLs it can present
    Availability {
        /// Receiver instance name
        target: String,

        /// URLs to check
        #[arg(required = true)]
        urls: Vec<String>,

        /// Skip discovery and dial this address
        #[arg(short, long)]
        addr: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.log_level, cli.json_logs)?;

    let config = CliConfig::load(cli.config.as_deref())?;

    // Handle Ctrl+C
    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Receive {
            name,
            bind,
            port,
            cert,
            key,
        } => {
            let name = name
                .or_else(|| config.receiver.name.clone())
                .context("No receiver name given on the command line or in the config file")?;
            let mut receiver = config.receiver_config(name);
            if let Some(bind) = bind {
                receiver.bind_addr = bind;
            }
            if let Some(port) = port {
                receiver.port = port;
            }
            let cert = cert.or_else(|| config.receiver.cert_file.clone());
            let key = key.or_else(|| config.receiver.key_file.clone());
            commands::receive(receiver, cert.zip(key), &shutdown).await?;
        }

        Commands::Browse { timeout, json } => {
            commands::browse(&config.service_type, timeout, json, &shutdown).await?;
        }

        Commands::Fling { target, url, addr } => {
            commands::fling(config.controller_config(), &target, &url, addr, &shutdown).await?;
        }

        Commands::Availability { target, urls, addr } => {
            commands::availability(config.controller_config(), &target, &urls, addr, &shutdown)
                .await?;
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}
