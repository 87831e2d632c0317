use anyhow::{anyhow, Result};
use covey_core::{Networkable, ParticipantId};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Debug, marker::PhantomData, net::SocketAddr, sync::Arc};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::{mpsc, oneshot, Mutex},
};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, error, info};

const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Correlates a request with its response across one framed connection.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Envelope<T: Debug> {
    pub id: u64,
    pub body: T,
}

/// What a serving loop sees from the transport. Callers are identified by
/// their peer address; the identity lives for the connection.
#[derive(Debug)]
pub enum ServerEvent<Req: Debug> {
    Request(ParticipantId, u64, Req),
    Disconnected(ParticipantId),
}

/// Routes responses back to the connection that asked.
pub struct ResponseSender<Resp: Debug> {
    tx: mpsc::Sender<(ParticipantId, Envelope<Resp>)>,
}

impl<Resp: Debug> Clone for ResponseSender<Resp> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<Resp: Debug> ResponseSender<Resp> {
    pub async fn send(&self, to: ParticipantId, id: u64, body: Resp) -> Result<()> {
        self.tx
            .send((to, Envelope { id, body }))
            .await
            .map_err(|_| anyhow!("server outgoing channel closed"))
    }
}

/// Accepts participant connections and multiplexes their requests into one
/// event stream.
pub struct TcpServer<Req, Resp>
where
    Req: Networkable + Debug,
    Resp: Networkable + Debug,
{
    events: mpsc::Receiver<ServerEvent<Req>>,
    responses: ResponseSender<Resp>,
    local_addr: SocketAddr,
}

impl<Req, Resp> TcpServer<Req, Resp>
where
    Req: Networkable + Debug,
    Resp: Networkable + Debug,
{
    pub async fn start(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("server listening on {}", local_addr);

        let (event_tx, events) = mpsc::channel(100);
        let (response_tx, mut outgoing_rx) = mpsc::channel::<(ParticipantId, Envelope<Resp>)>(100);
        let connections: Arc<Mutex<HashMap<ParticipantId, mpsc::Sender<Envelope<Resp>>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn({
            let connections = connections.clone();
            async move {
                while let Ok((stream, peer)) = listener.accept().await {
                    let connections = connections.clone();
                    let event_tx = event_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_connection(stream, peer.into(), connections, event_tx)
                                .await
                        {
                            error!("error handling connection from {}: {:?}", peer, e);
                        }
                    });
                }
            }
        });

        tokio::spawn({
            let connections = connections.clone();
            async move {
                while let Some((to, envelope)) = outgoing_rx.recv().await {
                    if let Some(conn) = connections.lock().await.get(&to) {
                        if conn.send(envelope).await.is_err() {
                            debug!(participant = %to, "dropping response for closed connection");
                        }
                    }
                }
            }
        });

        Ok(Self {
            events,
            responses: ResponseSender { tx: response_tx },
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for queueing responses, cloneable into request handler tasks.
    pub fn responses(&self) -> ResponseSender<Resp> {
        self.responses.clone()
    }

    pub async fn next(&mut self) -> Option<ServerEvent<Req>> {
        self.events.recv().await
    }

    async fn handle_connection(
        stream: TcpStream,
        identity: ParticipantId,
        connections: Arc<Mutex<HashMap<ParticipantId, mpsc::Sender<Envelope<Resp>>>>>,
        event_tx: mpsc::Sender<ServerEvent<Req>>,
    ) -> Result<()> {
        let mut codec = LengthDelimitedCodec::new();
        codec.set_max_frame_length(MAX_FRAME_LENGTH);
        let mut framed = Framed::new(stream, codec);

        let (conn_tx, mut conn_rx) = mpsc::channel(32);
        connections.lock().await.insert(identity.clone(), conn_tx);
        debug!(participant = %identity, "connection open");

        let result: Result<()> = async {
            loop {
                select! {
                    Some(envelope) = conn_rx.recv() => {
                        framed.send(envelope.to_bytes().into()).await?;
                    }
                    frame = framed.next() => match frame {
                        Some(Ok(bytes)) => {
                            let envelope = Envelope::<Req>::from_bytes(&bytes)?;
                            event_tx
                                .send(ServerEvent::Request(identity.clone(), envelope.id, envelope.body))
                                .await?;
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    },
                }
            }
        }
        .await;

        connections.lock().await.remove(&identity);
        debug!(participant = %identity, "connection closed");
        let _ = event_tx.send(ServerEvent::Disconnected(identity)).await;
        result
    }
}

/// A participant's connection to the coordinator.
///
/// Requests are correlated by envelope id, so concurrent calls (the
/// heartbeat task and an in-flight training call) share the connection.
pub struct TcpClient<Req, Resp>
where
    Req: Networkable + Debug,
    Resp: Networkable + Debug,
{
    requests: mpsc::Sender<(Req, oneshot::Sender<Resp>)>,
    _phantom: PhantomData<Resp>,
}

impl<Req, Resp> TcpClient<Req, Resp>
where
    Req: Networkable + Debug,
    Resp: Networkable + Debug,
{
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!("connected to server at {}", addr);

        let mut codec = LengthDelimitedCodec::new();
        codec.set_max_frame_length(MAX_FRAME_LENGTH);
        let framed = Framed::new(stream, codec);

        let (request_tx, request_rx) = mpsc::channel(16);
        tokio::spawn(Self::io_loop(framed, request_rx));

        Ok(Self {
            requests: request_tx,
            _phantom: PhantomData,
        })
    }

    /// Sends `request` and waits for the matching reply.
    pub async fn call(&self, request: Req) -> Result<Resp> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send((request, tx))
            .await
            .map_err(|_| anyhow!("connection closed"))?;
        rx.await
            .map_err(|_| anyhow!("connection closed before a reply arrived"))
    }

    async fn io_loop(
        mut framed: Framed<TcpStream, LengthDelimitedCodec>,
        mut requests: mpsc::Receiver<(Req, oneshot::Sender<Resp>)>,
    ) {
        let mut pending: HashMap<u64, oneshot::Sender<Resp>> = HashMap::new();
        let mut next_id: u64 = 0;
        loop {
            select! {
                request = requests.recv() => match request {
                    Some((body, respond_to)) => {
                        next_id += 1;
                        pending.insert(next_id, respond_to);
                        let envelope = Envelope { id: next_id, body };
                        if let Err(e) = framed.send(envelope.to_bytes().into()).await {
                            error!("failed to send request: {:?}", e);
                            break;
                        }
                    }
                    None => break,
                },
                frame = framed.next() => match frame {
                    Some(Ok(bytes)) => match Envelope::<Resp>::from_bytes(&bytes) {
                        Ok(envelope) => {
                            match pending.remove(&envelope.id) {
                                Some(respond_to) => {
                                    let _ = respond_to.send(envelope.body);
                                }
                                None => debug!(id = envelope.id, "reply for unknown request id"),
                            }
                        }
                        Err(e) => {
                            error!("undecodable frame from server: {:?}", e);
                            break;
                        }
                    },
                    Some(Err(e)) => {
                        error!("error reading from server: {:?}", e);
                        break;
                    }
                    None => break,
                },
            }
        }
        // dropping `pending` wakes every in-flight caller with an error
    }
}
