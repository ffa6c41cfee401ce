use clap::Parser;
use helpers::{enable_logging, set_full_stacktrace_as_default, wait_on_ctrl_c};

use std::{net::SocketAddr, path::PathBuf};

use crate::{
    app_context::AppContext,
    config::{ConfigToml, PersistentDataDir},
    relay::{RelaySocket, TlsUpstream, UpstreamConnector},
};

mod app_context;
mod config;
mod helpers;
mod relay;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "dotrelay - Relays plain DNS queries over UDP to a DNS-over-TLS resolver."
)]
struct Cli {
    /// Socket to listen on for DNS queries. Format: IP:Port. [default: 0.0.0.0:53]
    #[arg(short, long)]
    socket: Option<SocketAddr>,

    /// DNS-over-TLS resolver, hostname or IP. [default: 1.0.0.1]
    #[arg(long)]
    upstream_host: Option<String>,

    /// DNS-over-TLS resolver port. [default: 853]
    #[arg(long)]
    upstream_port: Option<u16>,

    /// Name to verify the resolver certificate against. [default: upstream host]
    #[arg(long)]
    tls_name: Option<String>,

    /// Connect and read timeout in seconds. [default: 10]
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Show verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// The base directory that contains dotrelay's configuration file.
    #[arg(short = 'd', long, default_value = "~/.dotrelay")]
    dotrelay_dir: PathBuf,
}

impl Cli {
    /// Command line flags win over the config file.
    fn apply(&self, config: &mut ConfigToml) {
        if let Some(socket) = self.socket {
            config.general.socket = socket;
        }
        if let Some(host) = &self.upstream_host {
            config.upstream.host = host.clone();
        }
        if let Some(port) = self.upstream_port {
            config.upstream.port = port;
        }
        if let Some(tls_name) = &self.tls_name {
            config.upstream.tls_name = Some(tls_name.clone());
        }
        if let Some(timeout) = self.timeout {
            config.upstream.timeout_secs = timeout;
        }
        if self.verbose {
            config.general.verbose = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    set_full_stacktrace_as_default();
    let cli = Cli::parse();

    let data_dir = PersistentDataDir::new(cli.dotrelay_dir.clone());
    let mut app_context = AppContext::from_data_dir(data_dir)?;
    cli.apply(&mut app_context.config);
    app_context.config.validate()?;

    enable_logging(app_context.config.general.verbose);
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    tracing::info!("Starting dotrelay v{VERSION}");
    if let Some(path) = &app_context.created_config_file {
        tracing::info!("Created a new config file {}.", path.display());
    }
    tracing::debug!("Data directory {}", app_context.data_dir.path().display());
    tracing::debug!("Configuration:\n{:?}", app_context.config);

    // Exit the main thread if anything panics
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("Thread paniced. Stop main thread too.");
        orig_hook(panic_info);
        std::process::exit(1);
    }));

    let connector = TlsUpstream::new(app_context.config.upstream.settings())?;
    tracing::info!("Forward queries to {} over TLS.", connector.describe());

    let relay = RelaySocket::new(app_context.config.general.socket, connector, &app_context.config.relay).await?;
    let listening = relay.local_addr()?;
    let handle = relay.start_receive_loop();

    tracing::info!("Listening on {listening}. Waiting for Ctrl-C...");

    wait_on_ctrl_c().await;
    println!();
    tracing::info!("Got it! Exiting...");
    handle.stop().await;

    Ok(())
}
