//! Periodic export of book snapshots to a pluggable sink.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PublisherConfig;
use crate::error::{Error, Result};
use crate::registry::BookRegistry;

/// Destination for serialized snapshots.
pub trait SnapshotSink: Send + Sync + 'static {
    fn publish(&self, payload: String) -> impl Future<Output = Result<()>> + Send;
}

/// Writes each snapshot as one JSON line. Writes run on the blocking pool so
/// a slow stdout or pipe never stalls the runtime.
pub struct WriterSink<W> {
    writer: Arc<Mutex<W>>,
}

impl<W: Write + Send + 'static> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// The underlying writer, once no write is in flight.
    pub fn into_inner(self) -> Option<W> {
        Arc::try_unwrap(self.writer).ok().map(Mutex::into_inner)
    }
}

impl WriterSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> SnapshotSink for WriterSink<W> {
    async fn publish(&self, payload: String) -> Result<()> {
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut writer = writer.lock();
            writer.write_all(payload.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Sink(format!("writer task failed: {e}")))?
    }
}

/// Forwards snapshots into a bounded channel.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end of a channel of `capacity` payloads.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl SnapshotSink for ChannelSink {
    async fn publish(&self, payload: String) -> Result<()> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| Error::Sink("snapshot channel closed".into()))
    }
}

/// Handle to the background publishing task. Dropping it stops the task
/// without waiting; [`stop`](Self::stop) waits.
pub struct SnapshotPublisher {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SnapshotPublisher {
    /// Spawn a task that publishes every valid book once per interval.
    ///
    /// Each round is awaited before the next tick, and ticks missed during a
    /// slow round are skipped rather than bunched up.
    pub fn start<S: SnapshotSink>(registry: Arc<BookRegistry>, sink: S, config: PublisherConfig) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut interval = time::interval(config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_ms = config.interval.as_millis() as u64, "snapshot publisher started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let published = publish_round(&registry, &sink).await;
                        debug!(published, "snapshot round done");
                    }
                    _ = token.cancelled() => break,
                }
            }
            info!("snapshot publisher stopped");
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop publishing and wait for an in-flight round to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "snapshot publisher task failed");
            }
        }
    }
}

impl Drop for SnapshotPublisher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Publish one snapshot per book that has both sides populated.
/// Returns how many were published.
async fn publish_round<S: SnapshotSink>(registry: &BookRegistry, sink: &S) -> usize {
    let mut published = 0;
    for (symbol, book) in registry.books() {
        let payload = {
            let svc = book.lock();
            if !svc.has_valid_data() {
                continue;
            }
            serde_json::to_string(&svc.snapshot())
        };
        let payload = match payload {
            Ok(p) => p,
            Err(e) => {
                warn!(%symbol, error = %e, "failed to serialize snapshot");
                continue;
            }
        };
        match sink.publish(payload).await {
            Ok(()) => published += 1,
            Err(e) => warn!(%symbol, error = %e, "failed to publish snapshot"),
        }
    }
    published
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::config::ServiceConfig;
    use crate::ws::events::{BookKind, BookLevel, BookUpdate};

    fn registry() -> Arc<BookRegistry> {
        Arc::new(BookRegistry::new(
            ServiceConfig::default(),
            &["ETH/USD".to_string(), "BTC/USD".to_string()],
        ))
    }

    fn two_sided(symbol: &str) -> BookUpdate {
        BookUpdate {
            symbol: Some(symbol.to_string()),
            bids: vec![BookLevel { price: dec!(100), qty: dec!(2) }],
            asks: vec![BookLevel { price: dec!(101), qty: dec!(3) }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn round_skips_books_without_valid_data() {
        let reg = registry();
        reg.apply(BookKind::Snapshot, &two_sided("ETH/USD"));

        let (sink, mut rx) = ChannelSink::channel(8);
        assert_eq!(publish_round(&reg, &sink).await, 1);

        let payload = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["symbol"], "ETH/USD");
        assert_eq!(value["bestBid"]["price"], "100");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn round_survives_prices_at_the_decimal_limit() {
        let reg = registry();
        let huge = rust_decimal::Decimal::from_str_exact("50000000000000000000000000000").unwrap();
        reg.apply(
            BookKind::Snapshot,
            &BookUpdate {
                symbol: Some("ETH/USD".into()),
                bids: vec![BookLevel { price: huge, qty: dec!(1) }],
                asks: vec![BookLevel { price: huge + huge / dec!(5), qty: dec!(1) }],
                ..Default::default()
            },
        );

        let (sink, mut rx) = ChannelSink::channel(8);
        assert_eq!(publish_round(&reg, &sink).await, 1);
        let value: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert!(value["midPrice"].is_null());
        assert_eq!(value["bestBid"]["quantity"], "1");
    }

    #[tokio::test]
    async fn round_with_no_data_publishes_nothing() {
        let reg = registry();
        let (sink, mut rx) = ChannelSink::channel(8);
        assert_eq!(publish_round(&reg, &sink).await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_every_interval_until_stopped() {
        let reg = registry();
        reg.apply(BookKind::Snapshot, &two_sided("BTC/USD"));

        let (sink, mut rx) = ChannelSink::channel(8);
        let publisher = SnapshotPublisher::start(
            Arc::clone(&reg),
            sink,
            PublisherConfig {
                interval: Duration::from_millis(100),
            },
        );

        for _ in 0..3 {
            let payload = rx.recv().await.unwrap();
            assert!(payload.contains("BTC/USD"));
        }
        assert!(publisher.is_running());

        publisher.stop().await;
        // The task dropped the sink, so the channel drains and closes.
        while rx.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn writer_sink_writes_json_lines() {
        let sink = WriterSink::new(Vec::new());
        sink.publish("{\"a\":1}".into()).await.unwrap();
        sink.publish("{\"a\":2}".into()).await.unwrap();
        assert_eq!(sink.into_inner().unwrap(), b"{\"a\":1}\n{\"a\":2}\n");
    }

    #[tokio::test]
    async fn closed_channel_is_a_sink_error() {
        let (sink, rx) = ChannelSink::channel(1);
        drop(rx);
        assert!(matches!(sink.publish("x".into()).await, Err(Error::Sink(_))));
    }
}
