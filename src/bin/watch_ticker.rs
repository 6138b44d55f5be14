//! Watches one ticker: snapshot + live inserts, logging the merged view on every change.
//!
//! Usage: `watch_ticker <TICKER> [--sync]`. With `--sync`, asks the service at
//! `$SYNC_ENDPOINT` (default `http://127.0.0.1:8000/sync`) to run one sync first.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use ticker_news_sync::config::{Credentials, SyncSettings};
use ticker_news_sync::store::{realtime::RealtimeFeed, supabase::SupabaseStore};
use ticker_news_sync::Watcher;

async fn request_sync(ticker: &str) -> Result<()> {
    let endpoint = std::env::var("SYNC_ENDPOINT")
        .unwrap_or_else(|_| "http://127.0.0.1:8000/sync".to_string());
    let resp = reqwest::Client::new()
        .post(&endpoint)
        .json(&serde_json::json!({ "ticker": ticker }))
        .send()
        .await
        .context("sync request")?;
    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    tracing::info!(%status, %body, "sync requested");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let ticker = args.next().context("usage: watch_ticker <TICKER> [--sync]")?;
    let do_sync = args.any(|a| a == "--sync");

    let creds = Credentials::store_from_env();
    creds.validate_store()?;
    let settings = SyncSettings::load_default()?;
    let url = creds.supabase_url.clone().unwrap_or_default();
    let key = creds.supabase_key.clone().unwrap_or_default();

    let store = SupabaseStore::new(&url, key, &settings.table)?;
    let feed = Arc::new(RealtimeFeed::new(
        store.project_url(),
        store.api_key().to_string(),
        store.table(),
    ));
    let store = Arc::new(store);

    let mut watcher = Watcher::new(store, feed);
    let mut view = watcher.view();
    watcher.watch(&ticker)?;

    if do_sync {
        if let Err(e) = request_sync(&ticker).await {
            tracing::warn!(error = %format!("{e:#}"), "sync request failed");
        }
    }

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let v = view.borrow_and_update().clone();
                tracing::info!(ticker = ?v.ticker, count = v.records.len(), "view updated");
                for r in v.records.iter().take(5) {
                    tracing::info!(
                        id = r.id,
                        created_at = %r.created_at.to_rfc3339(),
                        price = ?r.price,
                        change = ?r.price_change,
                        "{}",
                        r.summary
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    watcher.unwatch();
    println!("watch_ticker done");
    Ok(())
}
