use anyhow::Result;
use clap::Parser;
use covey_server::app::App;
use covey_server::config::ServerConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Coordinator of a federated-learning training session.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the TOML session configuration. Defaults apply when omitted.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Overrides the configured listen port.
    #[clap(short, long)]
    port: Option<u16>,

    /// Overrides the configured minimum number of selected participants.
    #[clap(long)]
    min_in_round: Option<usize>,

    /// Overrides the configured number of rounds.
    #[clap(long)]
    num_rounds: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(min_in_round) = args.min_in_round {
        config.session.min_in_round = min_in_round;
    }
    if let Some(num_rounds) = args.num_rounds {
        config.session.num_rounds = num_rounds;
    }

    let app = App::new(&config, config.listen_addr()).await?;
    info!(addr = %app.local_addr(), "coordinator waiting for participants");

    let shutdown = app.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    app.run().await
}
