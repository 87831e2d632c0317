use covey_coordinator::RunState;
use covey_core::Weights;
use covey_server::app::App;
use covey_server::config::ServerConfig;
use covey_server::service::Service;
use std::net::{Ipv4Addr, SocketAddr};
use tokio_util::sync::CancellationToken;

/// A full coordinator server on a loopback port, with direct access to its
/// service handle for state assertions.
pub struct CoordinatorServerHandle {
    pub addr: SocketAddr,
    service: Service,
    shutdown: CancellationToken,
}

impl CoordinatorServerHandle {
    pub async fn start(config: ServerConfig) -> Self {
        let app = App::new(&config, (Ipv4Addr::LOCALHOST, 0).into())
            .await
            .expect("failed to start test server");
        let addr = app.local_addr();
        let service = app.service();
        let shutdown = app.shutdown_token();
        tokio::spawn(app.run());
        Self {
            addr,
            service,
            shutdown,
        }
    }

    /// Server with the given session shape and everything else default.
    pub async fn with_session(min_in_round: usize, num_rounds: u32) -> Self {
        let mut config = ServerConfig::default();
        config.session.min_in_round = min_in_round;
        config.session.num_rounds = num_rounds;
        Self::start(config).await
    }

    pub fn addr_string(&self) -> String {
        self.addr.to_string()
    }

    pub async fn run_state(&self) -> RunState {
        self.service.run_state().await
    }

    pub async fn current_round(&self) -> u32 {
        self.service.current_round().await
    }

    pub async fn connected(&self) -> usize {
        self.service.num_connected().await
    }

    pub async fn weights(&self) -> Weights {
        self.service.weights().await
    }
}

impl Drop for CoordinatorServerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
