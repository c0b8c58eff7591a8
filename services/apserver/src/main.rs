use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use apserver::{Server, ServerConfig};
use svar_signals::Endpoint;

#[derive(Parser)]
#[command(name = "apserver")]
#[command(about = "Registry server for APL shared variables.", long_about = None)]
struct Cli {
    /// tcp:HOST:PORT, unix:PATH or abstract:NAME; may be repeated
    #[arg(long = "listen", value_name = "ENDPOINT")]
    listen: Vec<Endpoint>,

    /// Host UDP notifications are sent to
    #[arg(long, value_name = "ADDR")]
    notify_host: Option<IpAddr>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// JSON configuration file; flags override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("load config: {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if !cli.listen.is_empty() {
        config.endpoints = cli.listen;
    }
    if let Some(host) = cli.notify_host {
        config.notify_host = host;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting APL shared variable server");

    let server = Server::bind(&config).await?;
    for endpoint in server.endpoints()? {
        tracing::info!("Listening on {}", endpoint);
    }

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot wait for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
