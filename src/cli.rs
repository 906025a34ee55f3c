use clap::{Parser, ValueEnum};

use kraken_book::{SnapshotMode, KRAKEN_WS_URL};

/// kraken-book: live Kraken order books over WebSocket, served over HTTP.
#[derive(Parser, Debug)]
#[command(name = "kraken-book", version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Kraken WebSocket v2 endpoint
    #[arg(long, env = "KRAKEN_WSS_URL", default_value = KRAKEN_WS_URL)]
    pub url: String,

    /// Symbols to track (e.g. ETH/USD BTC/USD); the first is the HTTP default
    #[arg(long, env = "SYMBOLS", value_delimiter = ',', default_value = "ETH/USD")]
    pub symbols: Vec<String>,

    /// HTTP port for the readout API
    #[arg(long, env = "PORT", default_value = "3003")]
    pub port: u16,

    /// Book depth to subscribe with (10, 25, 100, 500 or 1000)
    #[arg(long)]
    pub depth: Option<u32>,

    /// Levels per side returned by top-N queries and snapshots
    #[arg(long, default_value = "10")]
    pub top_n: usize,

    /// Maximum levels kept per side (unbounded if unset)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// How snapshot messages are applied
    #[arg(long, value_enum, default_value = "incremental")]
    pub snapshot_mode: SnapshotModeArg,

    /// Skip exchange checksum verification
    #[arg(long)]
    pub no_checksum: bool,

    /// Price decimals to rescale levels to before checksumming
    #[arg(long, requires = "qty_precision")]
    pub price_precision: Option<u32>,

    /// Quantity decimals to rescale levels to before checksumming
    #[arg(long, requires = "price_precision")]
    pub qty_precision: Option<u32>,

    /// Print a JSON snapshot of every valid book to stdout at this interval (ms)
    #[arg(long)]
    pub publish_interval_ms: Option<u64>,

    /// Delay before reconnecting after the feed drops (ms)
    #[arg(long, default_value = "5000")]
    pub reconnect_delay_ms: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SnapshotModeArg {
    Incremental,
    Replace,
}

impl From<SnapshotModeArg> for SnapshotMode {
    fn from(arg: SnapshotModeArg) -> Self {
        match arg {
            SnapshotModeArg::Incremental => SnapshotMode::Incremental,
            SnapshotModeArg::Replace => SnapshotMode::Replace,
        }
    }
}
