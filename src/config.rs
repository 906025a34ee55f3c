//! Library configuration.
//!
//! Each struct has sensible defaults via [`Default`]; the binary fills them
//! from the command line and environment.

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::orderbook::Precision;

/// Default Kraken WebSocket v2 endpoint.
pub const KRAKEN_WS_URL: &str = "wss://ws.kraken.com/v2";

/// Connection and subscription settings for the feed client.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket endpoint, e.g. `wss://ws.kraken.com/v2`.
    pub url: String,
    /// Symbols to subscribe the `book` channel for (e.g. `"ETH/USD"`).
    pub symbols: Vec<String>,
    /// Book depth to request. `None` leaves the exchange default.
    pub depth: Option<u32>,
    /// Interval between client pings.
    pub ping_interval: Duration,
    /// How long to wait for a pong before dropping the connection.
    pub pong_timeout: Duration,
    /// Drop the connection after this long without any inbound frame.
    pub stale_threshold: Duration,
    /// How often to check for staleness.
    pub stale_check_interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: KRAKEN_WS_URL.to_string(),
            symbols: vec!["ETH/USD".to_string()],
            depth: None,
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            stale_threshold: Duration::from_secs(60),
            stale_check_interval: Duration::from_secs(10),
        }
    }
}

impl FeedConfig {
    /// Check the endpoint and symbol list.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("invalid feed url {:?}: {e}", self.url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "feed url must use ws or wss, got {}",
                url.scheme()
            )));
        }
        if self.symbols.is_empty() {
            return Err(Error::Config("at least one symbol is required".into()));
        }
        Ok(())
    }
}

/// How a `snapshot` book message is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotMode {
    /// Upsert into the existing book, exactly like an `update`.
    #[default]
    Incremental,
    /// Clear the book, then apply the snapshot.
    Replace,
}

/// Settings for each [`OrderBookService`](crate::service::OrderBookService).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Levels per side returned by top-N queries and snapshots.
    pub top_n: usize,
    /// Maximum levels kept per side. `None` keeps everything.
    pub max_depth: Option<usize>,
    pub snapshot_mode: SnapshotMode,
    /// Compare the exchange checksum after each batch.
    pub verify_checksum: bool,
    /// Instrument precision to rescale levels to before hashing. `None`
    /// hashes each level at the scale it arrived with.
    pub checksum_precision: Option<Precision>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            max_depth: None,
            snapshot_mode: SnapshotMode::Incremental,
            verify_checksum: true,
            checksum_precision: None,
        }
    }
}

/// Settings for the periodic snapshot publisher.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub interval: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}
