use covey_network::TcpClient;
use covey_protocol::{Request, Response, TrainingResult};
use std::net::SocketAddr;

/// Raw protocol driver for tests that assert on individual replies.
pub struct TestClient {
    client: TcpClient<Request, Response>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let client = TcpClient::connect(&addr.to_string())
            .await
            .expect("failed to connect test client");
        Self { client }
    }

    pub async fn rendezvous(&self) -> Response {
        self.call(Request::Rendezvous).await
    }

    pub async fn heartbeat(&self) -> Response {
        self.call(Request::Heartbeat).await
    }

    pub async fn start_training(&self) -> Response {
        self.call(Request::StartTrainingRound).await
    }

    pub async fn end_training(&self, result: TrainingResult) -> Response {
        self.call(Request::EndTrainingRound(result)).await
    }

    async fn call(&self, request: Request) -> Response {
        self.client
            .call(request)
            .await
            .expect("request to test server failed")
    }
}
