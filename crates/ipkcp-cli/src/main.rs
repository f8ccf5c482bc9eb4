#![deny(unsafe_code)]

//! IPKCP command line: run a calculator server or talk to one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ipkcp_config::{AppConfig, TransportMode};
use ipkcp_core::{Daemon, Shutdown, client};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// IPKCP: prefix-notation arithmetic over TCP and UDP.
#[derive(Parser)]
#[command(name = "ipkcp", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "ipkcp.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// `-h` names the host, so these subcommands only offer `--help`.
#[derive(clap::Args, Debug, Default, PartialEq, Eq)]
struct Endpoint {
    /// Host name or address.
    #[arg(short = 'h', long)]
    host: Option<String>,

    /// Port number.
    #[arg(short, long)]
    port: Option<u16>,

    /// Transport: tcp or udp.
    #[arg(short, long)]
    mode: Option<TransportMode>,

    /// Print help.
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the calculator server.
    #[command(disable_help_flag = true)]
    Server(Endpoint),

    /// Read expressions from stdin and send them to a server.
    #[command(disable_help_flag = true)]
    Client(Endpoint),

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, from_file) = load_config(&cli.config).await?;

    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    // stdout belongs to the client's replies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if !from_file {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Server(endpoint) => cmd_server(endpoint.apply(config)?).await?,
        Commands::Client(endpoint) => cmd_client(endpoint.apply(config)?).await?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

impl Endpoint {
    /// Overlay command-line values on the loaded configuration.
    fn apply(self, mut config: AppConfig) -> Result<AppConfig> {
        if let Some(host) = self.host {
            config.server.address = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(mode) = self.mode {
            config.server.mode = mode;
        }
        config.validate().context("invalid command-line options")?;
        Ok(config)
    }
}

async fn cmd_server(config: AppConfig) -> Result<()> {
    let daemon = Daemon::new(config);
    daemon.run().await?;
    Ok(())
}

async fn cmd_client(config: AppConfig) -> Result<()> {
    let target = host_port(&config.server.address, config.server.port);
    let addr = client::resolve(&target).await?;
    info!(%addr, mode = %config.server.mode, "connecting");

    let shutdown = Shutdown::new();
    let listener = shutdown.listener();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, closing"),
            Err(e) => warn!(error = %e, "signal handler failed"),
        }
        shutdown.trigger();
    });

    let input = BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();

    match config.server.mode {
        TransportMode::Tcp => {
            let stream = client::connect_tcp(addr).await?;
            client::run_tcp(input, &mut output, stream, listener).await?;
        }
        TransportMode::Udp => {
            let socket = client::connect_udp(addr).await?;
            let timeout = match config.client.response_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
            client::run_udp(input, &mut output, &socket, timeout, listener).await?;
        }
    }
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render configuration")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

/// Load the config file, or the defaults when it does not exist.
async fn load_config(path: &Path) -> Result<(AppConfig, bool)> {
    if path.exists() {
        let config = AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load '{}'", path.display()))?;
        Ok((config, true))
    } else {
        Ok((AppConfig::default(), false))
    }
}

/// Join host and port, bracketing IPv6 literals.
fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
