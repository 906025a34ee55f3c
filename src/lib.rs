pub mod api;
pub mod config;
pub mod error;
pub mod orderbook;
pub mod publisher;
pub mod registry;
pub mod service;
pub mod ws;

// ---- Top-level re-exports ----

// Config + errors
pub use config::{FeedConfig, PublisherConfig, ServiceConfig, SnapshotMode, KRAKEN_WS_URL};
pub use error::{Error, Result};

// Book core
pub use orderbook::{
    ApplyStats, LevelChange, OrderBook, Precision, PriceLevel, PriceLevelStore, SortOrder,
};

// Per-symbol services
pub use registry::{BookRegistry, SharedBook};
pub use service::{BookSnapshot, LevelView, OrderBookService, ServiceStats};

// Feed
pub use ws::events::{BookKind, BookLevel, BookMessage, BookUpdate, Channel, FeedMessage};
pub use ws::router::{ChannelHandler, Dispatch, MessageRouter};
pub use ws::{ConnectionState, FeedClient, FeedStats};

// Publishing
pub use publisher::{ChannelSink, SnapshotPublisher, SnapshotSink, WriterSink};
