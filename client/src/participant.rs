use crate::Trainer;
use anyhow::{anyhow, bail, Result};
use backon::{ConstantBuilder, Retryable};
use covey_coordinator::RunState;
use covey_network::TcpClient;
use covey_protocol::{RendezvousReply, Request, Response};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const RETRY_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_RENDEZVOUS_ATTEMPTS: usize = 120;

type Client = TcpClient<Request, Response>;

#[derive(Error, Debug)]
#[error("coordinator asked to retry later")]
struct RetryLater;

/// Drives one participant through a whole training session: rendezvous,
/// heartbeat, train when selected, disconnect on FINISHED.
pub struct Participant<T> {
    client: Arc<Client>,
    trainer: T,
    heartbeat_period: Duration,
}

impl<T: Trainer> Participant<T> {
    pub async fn connect(addr: &str, trainer: T, heartbeat_period: Duration) -> Result<Self> {
        Ok(Self {
            client: Arc::new(Client::connect(addr).await?),
            trainer,
            heartbeat_period,
        })
    }

    /// Runs until the session finishes or the connection dies.
    pub async fn run(mut self) -> Result<()> {
        self.rendezvous().await?;
        info!("rendezvous accepted");

        // Heartbeats run on their own task so a long local training round
        // never costs us the lease. Each reply's advertised state is
        // published to the training loop.
        let (state_tx, mut state_rx) = watch::channel((RunState::Standby, 0u32));
        let beat_client = self.client.clone();
        let period = self.heartbeat_period;
        let beats = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match heartbeat(&beat_client).await {
                    Ok(status) => {
                        if state_tx.send(status).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("heartbeat failed: {err:#}");
                        break;
                    }
                }
            }
        });

        let mut last_trained_round = 0u32;
        let result = loop {
            if state_rx.changed().await.is_err() {
                break Err(anyhow!("heartbeat task stopped"));
            }
            let (state, round) = *state_rx.borrow_and_update();
            debug!(%state, round, "heartbeat reply");
            match state {
                RunState::Finished => {
                    info!(round, "session finished, disconnecting");
                    break Ok(());
                }
                RunState::Round if round > last_trained_round => {
                    info!(round, "selected for round");
                    match self.train_one_round().await {
                        Ok(()) => last_trained_round = round,
                        Err(err) => warn!(round, "training round failed: {err:#}"),
                    }
                }
                _ => {}
            }
        };

        beats.abort();
        result
    }

    /// Rendezvous with the coordinator, retrying with a bounded backoff
    /// while it answers LATER.
    async fn rendezvous(&self) -> Result<()> {
        let attempt = || async {
            match self.client.call(Request::Rendezvous).await? {
                Response::Rendezvous(RendezvousReply::Accept) => Ok(()),
                Response::Rendezvous(RendezvousReply::Later) => Err(RetryLater.into()),
                other => Err(anyhow!("unexpected rendezvous reply: {other:?}")),
            }
        };
        attempt
            .retry(
                ConstantBuilder::default()
                    .with_delay(RETRY_TIMEOUT)
                    .with_max_times(MAX_RENDEZVOUS_ATTEMPTS),
            )
            .when(|err| err.is::<RetryLater>())
            .notify(|_, after| debug!("session full, retrying rendezvous in {after:?}"))
            .await
    }

    async fn train_one_round(&mut self) -> Result<()> {
        let (weights, epochs, epoch_base) =
            match self.client.call(Request::StartTrainingRound).await? {
                Response::StartTrainingRound {
                    weights,
                    epochs,
                    epoch_base,
                } => (weights, epochs, epoch_base),
                Response::Error(err) => {
                    bail!("start training rejected: {} ({:?})", err.message, err.code)
                }
                other => bail!("unexpected start-training reply: {other:?}"),
            };

        let result = self.trainer.train_round(weights, epochs, epoch_base).await?;

        match self.client.call(Request::EndTrainingRound(result)).await? {
            Response::EndTrainingRound => Ok(()),
            Response::Error(err) => bail!("update rejected: {} ({:?})", err.message, err.code),
            other => bail!("unexpected end-training reply: {other:?}"),
        }
    }
}

async fn heartbeat(client: &Client) -> Result<(RunState, u32)> {
    match client.call(Request::Heartbeat).await? {
        Response::Heartbeat { state, round } => Ok((state, round)),
        Response::Error(err) => bail!("heartbeat rejected: {} ({:?})", err.message, err.code),
        other => bail!("unexpected heartbeat reply: {other:?}"),
    }
}
