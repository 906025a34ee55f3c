//! In-memory order book maintained from feed update batches.

pub mod book;
pub mod checksum;
pub mod side;

pub use book::{ApplyStats, OrderBook};
pub use checksum::Precision;
pub use side::{LevelChange, PriceLevel, PriceLevelStore, SortOrder};
