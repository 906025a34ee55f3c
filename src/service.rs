//! Stateful façade over one [`OrderBook`]: tracks the active symbol,
//! freshness and checksum health, and renders serializable snapshots.

use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{ServiceConfig, SnapshotMode};
use crate::orderbook::{ApplyStats, OrderBook, PriceLevel};
use crate::ws::events::BookUpdate;

/// A level rendered for publication, e.g. `{"price":"2000.10","quantity":"1.5"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelView {
    pub price: String,
    pub quantity: String,
}

impl From<&PriceLevel> for LevelView {
    fn from(level: &PriceLevel) -> Self {
        Self {
            price: level.price.to_string(),
            quantity: level.quantity.to_string(),
        }
    }
}

/// Point-in-time view of a book, consistent across all fields.
///
/// `mid_price` and `spread` are `None` while either side is empty, so an
/// empty book is never mistaken for a zero spread.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub symbol: Option<String>,
    /// RFC 3339 generation time.
    pub timestamp: String,
    pub bids: Vec<LevelView>,
    pub asks: Vec<LevelView>,
    pub best_bid: Option<LevelView>,
    pub best_ask: Option<LevelView>,
    pub mid_price: Option<Decimal>,
    pub spread: Option<Decimal>,
}

/// Counters kept by a service.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub updates_applied: u64,
    pub levels_rejected: u64,
    pub checksum_mismatches: u64,
    pub last_checksum: Option<u32>,
}

#[derive(Debug)]
pub struct OrderBookService {
    book: OrderBook,
    config: ServiceConfig,
    current_symbol: Option<String>,
    last_update: Option<Instant>,
    last_exchange_timestamp: Option<String>,
    stats: ServiceStats,
}

impl OrderBookService {
    pub fn new(config: ServiceConfig) -> Self {
        let book = match config.max_depth {
            Some(depth) => OrderBook::with_max_depth(depth),
            None => OrderBook::new(),
        };
        Self {
            book,
            config,
            current_symbol: None,
            last_update: None,
            last_exchange_timestamp: None,
            stats: ServiceStats::default(),
        }
    }

    /// Apply an incremental batch.
    pub fn apply_update(&mut self, update: &BookUpdate) -> ApplyStats {
        let applied = self.book.apply_update(update);
        self.after_apply(update, applied);
        applied
    }

    /// Apply a `snapshot` batch according to the configured
    /// [`SnapshotMode`].
    pub fn apply_snapshot(&mut self, update: &BookUpdate) -> ApplyStats {
        let applied = match self.config.snapshot_mode {
            SnapshotMode::Incremental => self.book.apply_update(update),
            SnapshotMode::Replace => self.book.replace(update),
        };
        self.after_apply(update, applied);
        applied
    }

    fn after_apply(&mut self, update: &BookUpdate, applied: ApplyStats) {
        if let Some(symbol) = &update.symbol {
            self.current_symbol = Some(symbol.clone());
        }
        if update.timestamp.is_some() {
            self.last_exchange_timestamp = update.timestamp.clone();
        }
        self.last_update = Some(Instant::now());
        self.stats.updates_applied += 1;
        self.stats.levels_rejected += applied.rejected as u64;

        if let Some(expected) = update.checksum {
            self.stats.last_checksum = Some(expected);
            if self.config.verify_checksum {
                let actual = self.book.checksum_with(self.config.checksum_precision);
                if actual != expected {
                    self.stats.checksum_mismatches += 1;
                    warn!(
                        symbol = ?self.current_symbol,
                        expected,
                        actual,
                        "book checksum mismatch"
                    );
                }
            }
        }

        debug!(
            symbol = ?self.current_symbol,
            inserted = applied.inserted,
            updated = applied.updated,
            removed = applied.removed,
            "book batch applied"
        );
    }

    /// `true` once both sides have at least one level.
    pub fn has_valid_data(&self) -> bool {
        self.book.best_bid().is_some() && self.book.best_ask().is_some()
    }

    pub fn top_bids(&self) -> Vec<PriceLevel> {
        self.book.top_bids(self.config.top_n)
    }

    pub fn top_asks(&self) -> Vec<PriceLevel> {
        self.book.top_asks(self.config.top_n)
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.book.best_bid()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.book.best_ask()
    }

    /// `(best bid + best ask) / 2`, or `None` if either side is empty or
    /// the sum overflows.
    pub fn mid_price(&self) -> Option<Decimal> {
        let (bid, ask) = (self.book.best_bid()?, self.book.best_ask()?);
        bid.price
            .checked_add(ask.price)
            .and_then(|sum| sum.checked_div(Decimal::TWO))
    }

    /// `best ask - best bid`, or `None` if either side is empty or the
    /// difference overflows.
    pub fn spread(&self) -> Option<Decimal> {
        let (bid, ask) = (self.book.best_bid()?, self.book.best_ask()?);
        ask.price.checked_sub(bid.price)
    }

    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            symbol: self.current_symbol.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            bids: self.top_bids().iter().map(LevelView::from).collect(),
            asks: self.top_asks().iter().map(LevelView::from).collect(),
            best_bid: self.best_bid().as_ref().map(LevelView::from),
            best_ask: self.best_ask().as_ref().map(LevelView::from),
            mid_price: self.mid_price(),
            spread: self.spread(),
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        self.current_symbol.as_deref()
    }

    /// Exchange timestamp carried by the most recent batch, if any.
    pub fn last_exchange_timestamp(&self) -> Option<&str> {
        self.last_exchange_timestamp.as_deref()
    }

    /// `true` if nothing was applied within `threshold` (or ever).
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.last_update.map_or(true, |at| at.elapsed() > threshold)
    }

    pub fn stats(&self) -> ServiceStats {
        self.stats
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn top_n(&self) -> usize {
        self.config.top_n
    }
}
