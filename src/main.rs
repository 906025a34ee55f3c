mod cli;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kraken_book::{
    api, BookKind, BookRegistry, ChannelHandler, ConnectionState, FeedClient, FeedConfig,
    MessageRouter, Precision, PublisherConfig, Result, ServiceConfig, SnapshotPublisher, WriterSink,
};

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    // .env first so clap's env fallbacks see it
    let _ = dotenvy::dotenv();
    let cli = cli::Cli::parse();

    // Initialize tracing
    let filter = cli
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cancel = setup_signal_handlers();

    if let Err(e) = run(cli, cancel).await {
        error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

async fn run(cli: cli::Cli, cancel: CancellationToken) -> Result<()> {
    let feed_config = FeedConfig {
        url: cli.url,
        symbols: cli.symbols,
        depth: cli.depth,
        ..Default::default()
    };
    feed_config.validate()?;

    let service_config = ServiceConfig {
        top_n: cli.top_n,
        max_depth: cli.max_depth,
        snapshot_mode: cli.snapshot_mode.into(),
        verify_checksum: !cli.no_checksum,
        checksum_precision: cli
            .price_precision
            .zip(cli.qty_precision)
            .map(|(price, qty)| Precision { price, qty }),
    };
    info!(
        symbols = ?feed_config.symbols,
        snapshot_mode = ?service_config.snapshot_mode,
        "kraken-book starting"
    );

    let registry = Arc::new(BookRegistry::new(service_config, &feed_config.symbols));

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "http server listening");

    let mut client = FeedClient::new(feed_config, build_router(Arc::clone(&registry)));
    client.connect().await?;

    let publisher = cli.publish_interval_ms.map(|ms| {
        SnapshotPublisher::start(
            Arc::clone(&registry),
            WriterSink::stdout(),
            PublisherConfig {
                interval: Duration::from_millis(ms),
            },
        )
    });

    let server_cancel = cancel.clone();
    let app = api::router(Arc::clone(&registry));
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    supervise(&mut client, Duration::from_millis(cli.reconnect_delay_ms), &cancel).await;

    client.disconnect().await;
    if let Some(publisher) = publisher {
        publisher.stop().await;
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "http server error"),
        Err(e) => warn!(error = %e, "http server task panicked"),
    }

    let stats = client.stats();
    info!(
        frames = stats.frames_received,
        dropped = stats.frames_dropped,
        "shutdown complete"
    );
    Ok(())
}

/// Wire each feed channel to its consumer.
fn build_router(registry: Arc<BookRegistry>) -> MessageRouter {
    let mut router = MessageRouter::new();

    router.register(ChannelHandler::status(|msg| {
        for status in &msg.data {
            info!(
                system = %status.system,
                api_version = ?status.api_version,
                "exchange status"
            );
        }
    }));

    router.register(ChannelHandler::heartbeat(|| debug!("heartbeat")));

    router.register(ChannelHandler::book(move |msg| {
        for update in &msg.data {
            let applied = registry.apply(msg.kind, update);
            if msg.kind == BookKind::Snapshot {
                info!(
                    symbol = ?update.symbol,
                    levels = applied.inserted + applied.updated,
                    "book snapshot received"
                );
            }
        }
    }));

    router.register(ChannelHandler::subscription(|ack| {
        if ack.success {
            info!(method = %ack.method, result = ?ack.result, "request acknowledged");
        } else {
            warn!(method = %ack.method, error = ?ack.error, "request rejected");
        }
    }));

    router
}

/// Reconnect the feed whenever it drops, until shutdown.
async fn supervise(client: &mut FeedClient, delay: Duration, cancel: &CancellationToken) {
    let mut state = client.subscribe_state();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = state.wait_for(|s| *s == ConnectionState::Disconnected) => {
                if changed.is_err() {
                    return;
                }
            }
        }

        warn!(delay_ms = delay.as_millis() as u64, "feed disconnected, reconnecting");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        if let Err(e) = client.connect().await {
            warn!(error = %e, "reconnect failed");
        }
    }
}

/// Register SIGINT and SIGTERM handlers that trigger the returned token.
fn setup_signal_handlers() -> CancellationToken {
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received SIGINT, shutting down");
        cancel_clone.cancel();
    });

    #[cfg(unix)]
    {
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
            sig.recv().await;
            info!("received SIGTERM, shutting down");
            cancel_clone.cancel();
        });
    }

    cancel
}
