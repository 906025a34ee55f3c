pub mod events;
pub mod router;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::{Error, Result};

use events::{FeedMessage, SubscribeRequest};
use router::{Dispatch, MessageRouter};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of the feed connection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Frame counters for one client, across connections.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub frames_received: u64,
    pub frames_dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    dropped: AtomicU64,
}

/// WebSocket client for the exchange book feed.
///
/// [`connect`](Self::connect) opens the socket, sends the book subscription
/// and spawns a background task that decodes every text frame and hands it
/// to the [`MessageRouter`]. The client does not reconnect by itself;
/// callers watch [`subscribe_state`](Self::subscribe_state) and call
/// `connect` again if they want to.
pub struct FeedClient {
    config: FeedConfig,
    router: Arc<MessageRouter>,
    state_tx: watch::Sender<ConnectionState>,
    counters: Arc<Counters>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl FeedClient {
    /// Create a client (does not connect yet).
    pub fn new(config: FeedConfig, router: MessageRouter) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            router: Arc::new(router),
            state_tx,
            counters: Arc::new(Counters::default()),
            cancel: None,
            task: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            frames_received: self.counters.received.load(Ordering::Relaxed),
            frames_dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Open the connection and subscribe. Does nothing if already open.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket handshake or the subscription send
    /// fails; the client is then back in `Disconnected`.
    pub async fn connect(&mut self) -> Result<()> {
        if matches!(self.state(), ConnectionState::Open | ConnectionState::Connecting) {
            debug!("feed already connected");
            return Ok(());
        }
        // A previous connection may have ended on its own.
        self.cancel = None;
        self.task = None;

        self.state_tx.send_replace(ConnectionState::Connecting);
        info!(url = %self.config.url, "connecting");

        let (sink, stream) = match self.open().await {
            Ok(halves) => halves,
            Err(e) => {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        self.state_tx.send_replace(ConnectionState::Open);
        info!(symbols = ?self.config.symbols, "subscribed to book");

        let cancel = CancellationToken::new();
        let conn = Connection {
            router: Arc::clone(&self.router),
            counters: Arc::clone(&self.counters),
            state_tx: self.state_tx.clone(),
            cancel: cancel.clone(),
            ping_interval: self.config.ping_interval,
            pong_timeout: self.config.pong_timeout,
            stale_threshold: self.config.stale_threshold,
            stale_check_interval: self.config.stale_check_interval,
        };
        self.task = Some(tokio::spawn(conn.run(sink, stream)));
        self.cancel = Some(cancel);
        Ok(())
    }

    async fn open(&self) -> Result<(SplitSink<WsStream, Message>, SplitStream<WsStream>)> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(self.config.url.as_str()).await?;
        let (mut sink, stream) = ws_stream.split();

        let request = SubscribeRequest::book(&self.config.symbols, self.config.depth);
        sink.send(Message::Text(serde_json::to_string(&request)?)).await?;
        Ok((sink, stream))
    }

    /// Close the connection and wait for the background task to finish.
    /// Does nothing if already closed.
    pub async fn disconnect(&mut self) {
        let Some(cancel) = self.cancel.take() else {
            return;
        };
        if self.state() == ConnectionState::Open {
            self.state_tx.send_replace(ConnectionState::Closing);
        }
        cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
        info!("feed disconnected");
    }
}

impl Drop for FeedClient {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

/// Decode one text frame and dispatch it.
///
/// # Errors
///
/// Returns the decode error; the frame is not dispatched.
pub fn handle_text(router: &MessageRouter, text: &str) -> Result<Dispatch> {
    let message = FeedMessage::decode(text)?;
    Ok(router.dispatch(&message))
}

/// Everything the read loop needs, moved into the background task.
struct Connection {
    router: Arc<MessageRouter>,
    counters: Arc<Counters>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    ping_interval: Duration,
    pong_timeout: Duration,
    stale_threshold: Duration,
    stale_check_interval: Duration,
}

impl Connection {
    async fn run(self, sink: SplitSink<WsStream, Message>, stream: SplitStream<WsStream>) {
        match self.read_loop(sink, stream).await {
            Ok(()) => info!("feed connection closed"),
            Err(e) => warn!(error = %e, "feed connection lost"),
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    async fn read_loop(
        &self,
        mut sink: SplitSink<WsStream, Message>,
        mut stream: SplitStream<WsStream>,
    ) -> Result<()> {
        let mut last_message_time = Instant::now();
        let mut ping_interval = time::interval(self.ping_interval);
        ping_interval.tick().await;
        let mut stale_interval = time::interval(self.stale_check_interval);
        stale_interval.tick().await;
        let mut pong_deadline: Option<Instant> = None;

        loop {
            let pong_timeout_fut = match pong_deadline {
                Some(deadline) => time::sleep_until(deadline),
                None => time::sleep_until(Instant::now() + Duration::from_secs(86400)),
            };
            let pong_active = pong_deadline.is_some();

            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_message_time = Instant::now();
                            self.on_text(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            last_message_time = Instant::now();
                            sink.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_message_time = Instant::now();
                            pong_deadline = None;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(?frame, "received close frame");
                            return Err(Error::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            last_message_time = Instant::now();
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(Error::ConnectionClosed),
                    }
                }
                _ = ping_interval.tick() => {
                    debug!("sending ping");
                    sink.send(Message::Ping(vec![])).await?;
                    pong_deadline = Some(Instant::now() + self.pong_timeout);
                }
                _ = stale_interval.tick() => {
                    let elapsed = last_message_time.elapsed();
                    if elapsed > self.stale_threshold {
                        let ms = elapsed.as_millis() as u64;
                        warn!(elapsed_ms = ms, "connection stale");
                        return Err(Error::StaleConnection(ms));
                    }
                }
                _ = pong_timeout_fut, if pong_active => {
                    warn!("pong timeout");
                    return Err(Error::PongTimeout);
                }
                _ = self.cancel.cancelled() => {
                    debug!("shutdown requested, sending close frame");
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    fn on_text(&self, text: &str) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = handle_text(&self.router, text) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            match e {
                Error::UnknownChannel(channel) => debug!(%channel, "dropping frame on unknown channel"),
                e => warn!(error = %e, "dropping undecodable frame"),
            }
        }
    }
}
