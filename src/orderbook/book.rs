use crate::ws::events::BookUpdate;

use super::checksum::{self, Precision, CHECKSUM_DEPTH};
use super::side::{LevelChange, PriceLevel, PriceLevelStore, SortOrder};

/// Per-batch counts of what an apply did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub ignored: usize,
    pub rejected: usize,
}

impl ApplyStats {
    fn record(&mut self, change: LevelChange) {
        match change {
            LevelChange::Inserted => self.inserted += 1,
            LevelChange::Updated => self.updated += 1,
            LevelChange::Removed => self.removed += 1,
            LevelChange::Ignored => self.ignored += 1,
            LevelChange::Rejected => self.rejected += 1,
        }
    }
}

/// Bids and asks for a single symbol.
///
/// The bid store iterates highest price first and the ask store lowest price
/// first, so the first level of either side is always its best.
#[derive(Clone, Debug)]
pub struct OrderBook {
    bids: PriceLevelStore,
    asks: PriceLevelStore,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: PriceLevelStore::new(SortOrder::Descending),
            asks: PriceLevelStore::new(SortOrder::Ascending),
        }
    }

    /// A book that keeps at most `depth` levels per side.
    pub fn with_max_depth(depth: usize) -> Self {
        Self {
            bids: PriceLevelStore::with_max_depth(SortOrder::Descending, depth),
            asks: PriceLevelStore::with_max_depth(SortOrder::Ascending, depth),
        }
    }

    /// Upsert every bid and ask level of the batch. Zero quantities remove
    /// their level; applying the same batch twice leaves the same book.
    pub fn apply_update(&mut self, update: &BookUpdate) -> ApplyStats {
        let mut stats = ApplyStats::default();
        for level in &update.bids {
            stats.record(self.bids.upsert(level.price, level.qty));
        }
        for level in &update.asks {
            stats.record(self.asks.upsert(level.price, level.qty));
        }
        stats
    }

    /// Clear both sides, then apply the batch.
    pub fn replace(&mut self, update: &BookUpdate) -> ApplyStats {
        self.clear();
        self.apply_update(update)
    }

    pub fn top_bids(&self, n: usize) -> Vec<PriceLevel> {
        self.bids.top(n)
    }

    pub fn top_asks(&self, n: usize) -> Vec<PriceLevel> {
        self.asks.top(n)
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.best()
    }

    pub fn bids(&self) -> &PriceLevelStore {
        &self.bids
    }

    pub fn asks(&self) -> &PriceLevelStore {
        &self.asks
    }

    /// `(bid levels, ask levels)`.
    pub fn depth(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// Exchange checksum over the current top of book.
    pub fn checksum(&self) -> u32 {
        self.checksum_with(None)
    }

    /// [`checksum`](Self::checksum) with levels rescaled to `precision`.
    pub fn checksum_with(&self, precision: Option<Precision>) -> u32 {
        checksum::checksum_with(
            &self.asks.top(CHECKSUM_DEPTH),
            &self.bids.top(CHECKSUM_DEPTH),
            precision,
        )
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }
}
