//! One [`OrderBookService`] per symbol.
//!
//! Each service sits behind its own mutex. An apply holds the lock for the
//! whole batch and a snapshot read holds it for the whole render, so readers
//! never see a half-applied batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::config::ServiceConfig;
use crate::orderbook::ApplyStats;
use crate::service::OrderBookService;
use crate::ws::events::{BookKind, BookUpdate};

pub type SharedBook = Arc<Mutex<OrderBookService>>;

#[derive(Debug)]
pub struct BookRegistry {
    config: ServiceConfig,
    default_symbol: String,
    books: RwLock<BTreeMap<String, SharedBook>>,
}

impl BookRegistry {
    /// Create a registry with an empty book for each of `symbols`. The first
    /// symbol is the default for queries and for batches without a symbol.
    pub fn new(config: ServiceConfig, symbols: &[String]) -> Self {
        let default_symbol = symbols.first().cloned().unwrap_or_default();
        let books = symbols
            .iter()
            .map(|s| (s.clone(), new_book(&config)))
            .collect();
        Self {
            config,
            default_symbol,
            books: RwLock::new(books),
        }
    }

    /// Apply a book batch to the book of its symbol, creating that book on
    /// first sight.
    pub fn apply(&self, kind: BookKind, update: &BookUpdate) -> ApplyStats {
        let symbol = update.symbol.as_deref().unwrap_or(&self.default_symbol);
        let book = self.get_or_create(symbol);
        let mut svc = book.lock();
        match kind {
            BookKind::Snapshot => svc.apply_snapshot(update),
            BookKind::Update => svc.apply_update(update),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<SharedBook> {
        self.books.read().get(symbol).cloned()
    }

    /// Book for `symbol`, or the default book when `symbol` is `None`.
    pub fn resolve(&self, symbol: Option<&str>) -> Option<SharedBook> {
        self.get(symbol.unwrap_or(&self.default_symbol))
    }

    pub fn default_book(&self) -> Option<SharedBook> {
        self.get(&self.default_symbol)
    }

    pub fn default_symbol(&self) -> &str {
        &self.default_symbol
    }

    pub fn symbols(&self) -> Vec<String> {
        self.books.read().keys().cloned().collect()
    }

    /// Every `(symbol, book)` pair, sorted by symbol.
    pub fn books(&self) -> Vec<(String, SharedBook)> {
        self.books
            .read()
            .iter()
            .map(|(s, b)| (s.clone(), Arc::clone(b)))
            .collect()
    }

    fn get_or_create(&self, symbol: &str) -> SharedBook {
        if let Some(book) = self.books.read().get(symbol) {
            return Arc::clone(book);
        }
        let mut books = self.books.write();
        Arc::clone(books.entry(symbol.to_string()).or_insert_with(|| {
            info!(symbol, "tracking new book");
            new_book(&self.config)
        }))
    }
}

fn new_book(config: &ServiceConfig) -> SharedBook {
    Arc::new(Mutex::new(OrderBookService::new(config.clone())))
}
