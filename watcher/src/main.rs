//! Rill Watcher - keeps declared views of a PostgREST API live.
//!
//! Loads the view declarations, seeds every view from PostgREST and polls it
//! for changes until interrupted.

use std::sync::Arc;

use rill_watcher::{load_views, PollSettings, PostgrestClient, StoreUpdate, Watcher, WatcherConfig};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rill_watcher=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = WatcherConfig::from_env()?;

    tracing::info!(
        "Starting Rill Watcher for {} ({})",
        config.postgrest_url,
        config.views_file.display()
    );

    let specs = load_views(&config.views_file)?;
    let watcher = Watcher::from_specs(specs, config.watcher_options())?;
    let client = Arc::new(PostgrestClient::new(config.postgrest_url.clone()));

    // Log every update
    let reader = watcher.reader();
    let mut updates = watcher.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(StoreUpdate::Seeded { view, records }) => {
                    tracing::info!(view = %view, records, "Snapshot loaded");
                }
                Ok(StoreUpdate::Changed { table, kind, views }) => {
                    for view in &views {
                        tracing::info!(view = %view, table = %table, kind = ?kind, records = ?reader.len(view), "View changed");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Update logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
        }
        shutdown.cancel();
    });

    tracing::info!("Loading snapshots and polling for changes...");
    let settings = PollSettings {
        interval: config.poll_interval,
        retry_delay: config.retry_delay,
    };
    watcher.watch_polled(client, settings, cancel).await;

    Ok(())
}
