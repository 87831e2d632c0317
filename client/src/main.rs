use anyhow::Result;
use clap::Parser;
use covey_client::{DummyTrainer, Participant};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Federated-learning participant running a pass-through local trainer.
#[derive(Parser, Debug)]
struct Args {
    /// Coordinator address, e.g. localhost:50051.
    #[clap(long)]
    server_addr: String,

    /// Seconds between heartbeats.
    #[clap(long, default_value_t = 10.0)]
    heartbeat_period: f64,

    /// Sample count reported with each update.
    #[clap(long, default_value_t = 1)]
    sample_count: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let trainer = DummyTrainer {
        sample_count: args.sample_count,
    };
    let participant = Participant::connect(
        &args.server_addr,
        trainer,
        Duration::from_secs_f64(args.heartbeat_period),
    )
    .await?;
    participant.run().await
}
