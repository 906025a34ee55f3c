//! One side of the book: an ordered price → quantity map.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A resting quantity at a price.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    #[serde(rename = "qty")]
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Iteration order of a [`PriceLevelStore`]. The first iterated level is
/// the best one, so bids use `Descending` and asks use `Ascending`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Effect of a single [`PriceLevelStore::upsert`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LevelChange {
    Inserted,
    Updated,
    Removed,
    /// Zero quantity for a price that was not present.
    Ignored,
    /// Negative quantity; the store was not touched.
    Rejected,
}

/// Price levels for one side of the book, backed by a `BTreeMap` for
/// O(log n) upserts and sorted iteration in both directions.
#[derive(Clone, Debug)]
pub struct PriceLevelStore {
    levels: BTreeMap<Decimal, Decimal>,
    order: SortOrder,
    max_depth: Option<usize>,
}

impl PriceLevelStore {
    /// Create an empty, unbounded store.
    pub fn new(order: SortOrder) -> Self {
        Self {
            levels: BTreeMap::new(),
            order,
            max_depth: None,
        }
    }

    /// Create an empty store that keeps at most `max_depth` levels. The
    /// worst levels are dropped first when the bound is exceeded.
    pub fn with_max_depth(order: SortOrder, max_depth: usize) -> Self {
        Self {
            levels: BTreeMap::new(),
            order,
            max_depth: Some(max_depth),
        }
    }

    /// Insert, overwrite or remove the level at `price`.
    ///
    /// A zero `quantity` removes the level (no-op when absent). Negative
    /// quantities are rejected and leave the store unchanged.
    pub fn upsert(&mut self, price: Decimal, quantity: Decimal) -> LevelChange {
        if quantity < Decimal::ZERO {
            warn!(%price, %quantity, "rejecting level with negative quantity");
            return LevelChange::Rejected;
        }

        if quantity.is_zero() {
            return match self.levels.remove(&price) {
                Some(_) => LevelChange::Removed,
                None => LevelChange::Ignored,
            };
        }

        match self.levels.insert(price, quantity) {
            Some(_) => LevelChange::Updated,
            None => {
                self.trim();
                LevelChange::Inserted
            }
        }
    }

    /// Up to `n` levels, best first.
    pub fn top(&self, n: usize) -> Vec<PriceLevel> {
        match self.order {
            SortOrder::Ascending => self.levels.iter().take(n).map(to_level).collect(),
            SortOrder::Descending => self.levels.iter().rev().take(n).map(to_level).collect(),
        }
    }

    /// The best level, or `None` when the side is empty.
    pub fn best(&self) -> Option<PriceLevel> {
        match self.order {
            SortOrder::Ascending => self.levels.first_key_value().map(to_level),
            SortOrder::Descending => self.levels.last_key_value().map(to_level),
        }
    }

    /// Every level, best first.
    pub fn levels(&self) -> Vec<PriceLevel> {
        self.top(self.levels.len())
    }

    /// Quantity resting at `price`, if any.
    pub fn get(&self, price: &Decimal) -> Option<Decimal> {
        self.levels.get(price).copied()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Drop the worst levels until the depth bound holds.
    fn trim(&mut self) {
        let Some(max) = self.max_depth else {
            return;
        };
        while self.levels.len() > max {
            match self.order {
                // Worst ask is the highest price.
                SortOrder::Ascending => self.levels.pop_last(),
                // Worst bid is the lowest price.
                SortOrder::Descending => self.levels.pop_first(),
            };
        }
    }
}

fn to_level((price, quantity): (&Decimal, &Decimal)) -> PriceLevel {
    PriceLevel {
        price: *price,
        quantity: *quantity,
    }
}
