// src/reconcile.rs
//! Live merge: one deduplicated, newest-first view of a ticker's records, built from a
//! snapshot query plus the live insert stream.
//!
//! A record may arrive through the snapshot, the stream, or both; dedup by `id` makes the
//! double delivery harmless. Snapshot order is authoritative for what it captured,
//! prepend order for everything after.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::model::{normalize_ticker, NewsRecord};
use crate::store::{ChangeFeed, RecordStore, Subscription};

/// Client-held state for one watched ticker.
#[derive(Debug, Default, Clone)]
pub struct ReconcilerState {
    records: VecDeque<NewsRecord>,
    ids: HashSet<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Prepended,
    Duplicate,
}

impl ReconcilerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the view wholesale. `records` is expected newest first.
    pub fn apply_snapshot(&mut self, records: Vec<NewsRecord>) {
        self.ids = records.iter().map(|r| r.id).collect();
        self.records = records.into();
    }

    /// Prepend unless the id is already present.
    pub fn apply_insert(&mut self, record: NewsRecord) -> InsertResult {
        if !self.ids.insert(record.id) {
            return InsertResult::Duplicate;
        }
        self.records.push_front(record);
        InsertResult::Prepended
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &NewsRecord> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<NewsRecord> {
        self.records.iter().cloned().collect()
    }
}

/// Published view of the watched ticker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchView {
    /// Bumped on every watch/unwatch; stale tasks cannot publish over a newer watch.
    pub generation: u64,
    pub ticker: Option<String>,
    pub records: Vec<NewsRecord>,
}

/// Owns at most one watch task. All mutation of the view happens on that task.
pub struct Watcher {
    store: Arc<dyn RecordStore>,
    feed: Arc<dyn ChangeFeed>,
    view_tx: watch::Sender<WatchView>,
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl Watcher {
    pub fn new(store: Arc<dyn RecordStore>, feed: Arc<dyn ChangeFeed>) -> Self {
        let (view_tx, _) = watch::channel(WatchView::default());
        Self {
            store,
            feed,
            view_tx,
            task: None,
            generation: 0,
        }
    }

    /// Receiver that sees every published view.
    pub fn view(&self) -> watch::Receiver<WatchView> {
        self.view_tx.subscribe()
    }

    pub fn current(&self) -> WatchView {
        self.view_tx.borrow().clone()
    }

    pub fn is_watching(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Start watching `raw_ticker`, discarding any previous watch and its state.
    pub fn watch(&mut self, raw_ticker: &str) -> anyhow::Result<()> {
        let ticker = normalize_ticker(raw_ticker)
            .ok_or_else(|| anyhow::anyhow!("ticker is required"))?;
        self.unwatch();
        self.generation += 1;
        self.view_tx.send_replace(WatchView {
            generation: self.generation,
            ticker: Some(ticker.clone()),
            records: Vec::new(),
        });

        let slot = ViewSlot {
            generation: self.generation,
            ticker,
            view_tx: self.view_tx.clone(),
        };
        let store = Arc::clone(&self.store);
        let feed = Arc::clone(&self.feed);
        self.task = Some(tokio::spawn(run_watch(slot, store, feed)));
        Ok(())
    }

    /// Release the subscription. Events still in flight are discarded.
    pub fn unwatch(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.generation += 1;
            self.view_tx.send_replace(WatchView {
                generation: self.generation,
                ..WatchView::default()
            });
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Where one watch task publishes.
struct ViewSlot {
    generation: u64,
    ticker: String,
    view_tx: watch::Sender<WatchView>,
}

impl ViewSlot {
    /// Publishes only while this task's generation is current; the check runs under the
    /// channel lock so an aborted task cannot overwrite a newer view.
    fn publish(&self, state: &ReconcilerState) -> bool {
        self.view_tx.send_if_modified(|view| {
            if view.generation != self.generation {
                return false;
            }
            view.records = state.to_vec();
            true
        })
    }
}

/// Delay before the first resubscribe; doubles per failed attempt up to [`RESUBSCRIBE_MAX`].
const RESUBSCRIBE_MIN: Duration = Duration::from_millis(250);
const RESUBSCRIBE_MAX: Duration = Duration::from_secs(30);
/// A stream that stayed up this long resets the backoff.
const STABLE_STREAM: Duration = Duration::from_secs(10);

/// Subscribe first so nothing inserted during the snapshot query is missed; events
/// buffered meanwhile are applied after the snapshot.
///
/// Runs until aborted. Whenever the live stream ends (or cannot be opened) the task
/// backs off, subscribes again and re-reads the snapshot, so inserts made while
/// disconnected still reach the view.
async fn run_watch(slot: ViewSlot, store: Arc<dyn RecordStore>, feed: Arc<dyn ChangeFeed>) {
    let ticker = slot.ticker.as_str();
    let mut state = ReconcilerState::new();
    let mut backoff = RESUBSCRIBE_MIN;
    let mut attempt: u64 = 0;

    loop {
        if attempt > 0 {
            counter!("reconcile_resubscribes_total").increment(1);
        }
        attempt += 1;

        let sub = match feed.subscribe(ticker).await {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(target: "reconcile", %ticker, attempt, error = %format!("{e:#}"), "live subscription failed");
                None
            }
        };

        match store.query(ticker).await {
            Ok(rows) => {
                info!(target: "reconcile", %ticker, count = rows.len(), "snapshot applied");
                state.apply_snapshot(rows);
                slot.publish(&state);
            }
            Err(e) => {
                warn!(target: "reconcile", %ticker, error = %format!("{e:#}"), "snapshot query failed");
            }
        }

        if let Some(mut sub) = sub {
            let opened = Instant::now();
            drain(&slot, &mut state, &mut sub).await;
            if opened.elapsed() >= STABLE_STREAM {
                backoff = RESUBSCRIBE_MIN;
            }
            info!(target: "reconcile", %ticker, "live stream ended; resubscribing");
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RESUBSCRIBE_MAX);
    }
}

/// Apply live events until the subscription closes.
async fn drain(slot: &ViewSlot, state: &mut ReconcilerState, sub: &mut Subscription) {
    let ticker = slot.ticker.as_str();
    while let Some(row) = sub.next().await {
        let record = match NewsRecord::from_row(row) {
            Ok(r) => r,
            Err(e) => {
                counter!("reconcile_events_dropped_total").increment(1);
                warn!(target: "reconcile", %ticker, error = %e, "dropping malformed live event");
                continue;
            }
        };
        if record.ticker != ticker {
            counter!("reconcile_events_dropped_total").increment(1);
            warn!(target: "reconcile", %ticker, got = %record.ticker, "dropping event for another ticker");
            continue;
        }
        match state.apply_insert(record) {
            InsertResult::Prepended => {
                counter!("reconcile_events_applied_total").increment(1);
                slot.publish(state);
            }
            InsertResult::Duplicate => {
                counter!("reconcile_events_duplicate_total").increment(1);
                debug!(target: "reconcile", %ticker, "duplicate live event ignored");
            }
        }
    }
}
