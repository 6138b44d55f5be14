// src/store/memory.rs
//! In-process store with a broadcast change feed. Used by tests and local runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};

use super::{ChangeFeed, RecordStore, Subscription};
use crate::model::{NewRecord, NewsRecord};

#[derive(Debug)]
struct Inner {
    rows: Vec<NewsRecord>,
    next_id: i64,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    feed: broadcast::Sender<NewsRecord>,
    inserts: AtomicUsize,
    fail_inserts: Option<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(Inner {
                rows: Vec::new(),
                next_id: 1,
            }),
            feed,
            inserts: AtomicUsize::new(0),
            fail_inserts: None,
        }
    }

    /// Every insert fails with `detail`.
    pub fn failing(detail: &str) -> Self {
        Self {
            fail_inserts: Some(detail.to_string()),
            ..Self::new()
        }
    }

    /// Attempted inserts, failed ones included.
    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Seed a row with an explicit timestamp (no feed event).
    pub fn seed(&self, ticker: &str, summary: &str, created_at: DateTime<Utc>) -> NewsRecord {
        let mut g = self.inner.lock().expect("memory store poisoned");
        let rec = NewsRecord {
            id: g.next_id,
            ticker: ticker.to_string(),
            summary: summary.to_string(),
            price: None,
            price_change: None,
            percent_change: None,
            created_at,
        };
        g.next_id += 1;
        g.rows.push(rec.clone());
        rec
    }

    pub fn rows(&self) -> Vec<NewsRecord> {
        self.inner.lock().expect("memory store poisoned").rows.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, row: &NewRecord) -> Result<NewsRecord> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if let Some(detail) = &self.fail_inserts {
            return Err(anyhow!("{detail}"));
        }
        let rec = {
            let mut g = self.inner.lock().expect("memory store poisoned");
            let rec = NewsRecord {
                id: g.next_id,
                ticker: row.ticker.clone(),
                summary: row.summary.clone(),
                price: row.price,
                price_change: row.price_change,
                percent_change: row.percent_change,
                created_at: Utc::now(),
            };
            g.next_id += 1;
            g.rows.push(rec.clone());
            rec
        };
        // No receivers is fine.
        let _ = self.feed.send(rec.clone());
        Ok(rec)
    }

    async fn query(&self, ticker: &str) -> Result<Vec<NewsRecord>> {
        let g = self.inner.lock().expect("memory store poisoned");
        let mut out: Vec<NewsRecord> = g.rows.iter().filter(|r| r.ticker == ticker).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn subscribe(&self, ticker: &str) -> Result<Subscription> {
        let mut feed = self.feed.subscribe();
        let ticker = ticker.to_string();
        let (tx, rx) = mpsc::channel(256);
        let pump = tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(rec) if rec.ticker == ticker => {
                        let row = match serde_json::to_value(&rec) {
                            Ok(v) => v,
                            Err(_) => continue,
                        };
                        if tx.send(row).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(target: "store", skipped = n, "memory feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscription::new(rx, Some(pump)))
    }
}
