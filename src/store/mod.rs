// src/store/mod.rs
//! Durable store collaborator: single-row insert, per-ticker snapshot query, and a
//! live insert feed.

pub mod memory;
pub mod realtime;
pub mod supabase;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::model::{NewRecord, NewsRecord};

#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// One atomic insert. Returns the row with server-assigned `id` / `created_at`.
    ///
    /// An error does not always mean nothing was written: a remote store can commit the
    /// row and then fail to return it.
    async fn insert(&self, row: &NewRecord) -> Result<NewsRecord>;
    /// All rows for `ticker`, `created_at` descending.
    async fn query(&self, ticker: &str) -> Result<Vec<NewsRecord>>;
}

#[async_trait::async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Rows inserted for `ticker` from now on, as raw JSON (decoding is the consumer's job).
    async fn subscribe(&self, ticker: &str) -> Result<Subscription>;
}

/// A live insert stream. Dropping it releases the upstream subscription.
pub struct Subscription {
    events: mpsc::Receiver<serde_json::Value>,
    pump: Option<JoinHandle<()>>,
}

impl Subscription {
    /// `pump` is the task feeding `events`; it is aborted on drop.
    pub fn new(events: mpsc::Receiver<serde_json::Value>, pump: Option<JoinHandle<()>>) -> Self {
        Self { events, pump }
    }

    /// `None` once the feed has closed.
    pub async fn next(&mut self) -> Option<serde_json::Value> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.events.close();
        if let Some(h) = self.pump.take() {
            h.abort();
        }
    }
}
