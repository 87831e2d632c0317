use crate::config::ServerConfig;
use crate::monitor::monitor_heartbeats;
use crate::service::Service;
use crate::store::{FsWeightsStore, NoopStore, WeightsStore};
use anyhow::{ensure, Context, Result};
use covey_coordinator::Coordinator;
use covey_core::{Networkable, Weights};
use covey_network::{ServerEvent, TcpServer};
use covey_protocol::{Request, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// The assembled coordinator server: transport, request dispatch and the
/// heartbeat monitor, wired to one shutdown token.
pub struct App {
    net_server: TcpServer<Request, Response>,
    service: Service,
    shutdown: CancellationToken,
}

impl App {
    pub async fn new(config: &ServerConfig, listen_addr: SocketAddr) -> Result<Self> {
        let session = config.session_config();
        ensure!(
            session.check(),
            "invalid session configuration: {session:?}"
        );

        let weights = match &config.session.initial_weights {
            Some(path) => {
                let blob = std::fs::read(path)
                    .with_context(|| format!("failed to read initial weights {path:?}"))?;
                Weights::from_bytes(&blob)
                    .with_context(|| format!("failed to decode initial weights {path:?}"))?
            }
            None => Weights::new(),
        };

        let store: Arc<dyn WeightsStore> = match &config.storage.dir {
            Some(dir) => Arc::new(FsWeightsStore::new(dir.clone())?),
            None => Arc::new(NoopStore),
        };

        let coordinator = Coordinator::with_defaults(session, weights);
        let service = Service::new(coordinator, store);
        let net_server = TcpServer::start(listen_addr).await?;

        Ok(Self {
            net_server,
            service,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.net_server.local_addr()
    }

    pub fn service(&self) -> Service {
        self.service.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serves until the shutdown token fires. Requests are handled on their
    /// own tasks, so a slow round close never blocks heartbeats of other
    /// participants at the transport level.
    pub async fn run(mut self) -> Result<()> {
        let monitor = tokio::spawn(monitor_heartbeats(
            self.service.clone(),
            self.shutdown.clone(),
        ));
        let responses = self.net_server.responses();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = self.net_server.next() => match event {
                    Some(ServerEvent::Request(from, id, request)) => {
                        let service = self.service.clone();
                        let responses = responses.clone();
                        tokio::spawn(async move {
                            let response = service.handle(&from, request).await;
                            if let Err(err) = responses.send(from, id, response).await {
                                warn!("failed to queue response: {err:#}");
                            }
                        });
                    }
                    Some(ServerEvent::Disconnected(from)) => {
                        self.service.remove_participant(&from).await;
                    }
                    None => break,
                },
            }
        }

        self.shutdown.cancel();
        monitor.await?;
        Ok(())
    }
}
