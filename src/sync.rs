// src/sync.rs
//! Sync orchestrator: quote + headlines -> summary -> embedding -> one inserted record.
//!
//! Phases: `Idle -> FetchingQuote -> FetchingNews -> (NoNewsFound | Summarizing) -> Embedding
//! -> Persisting -> Done`, with `Failed(step)` reachable from every non-terminal phase.
//! Both fetch phases are entered before either request is awaited; the fetches overlap.
//! Nothing is retried and nothing is rolled back; the only write is the final insert.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn, Instrument};

use crate::config::{Credentials, SyncSettings};
use crate::error::{SyncError, SyncStep};
use crate::genai::{summary_prompt, TextGenerator};
use crate::market::{build_digest, news_window, MarketData};
use crate::model::{normalize_ticker, NewRecord, Quote};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    FetchingQuote,
    FetchingNews,
    NoNewsFound,
    Summarizing,
    Embedding,
    Persisting,
    Done,
    Failed(SyncStep),
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Failed(step) => write!(f, "failed({step})"),
            other => write!(f, "{}", format!("{other:?}").to_ascii_lowercase()),
        }
    }
}

/// Echoed back to the caller after a successful insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub ticker: String,
    pub summary: String,
    pub quote: Quote,
    pub record_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Done(SyncReport),
    /// Provider returned nothing to summarize. Not an error.
    NoNewsFound { ticker: String },
}

impl SyncOutcome {
    fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Done(_) => "done",
            SyncOutcome::NoNewsFound { .. } => "no_news",
        }
    }
}

/// Stateless per call; collaborators are injected once and shared.
pub struct SyncOrchestrator {
    credentials: Credentials,
    settings: SyncSettings,
    market: Arc<dyn MarketData>,
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn RecordStore>,
}

impl SyncOrchestrator {
    pub fn new(
        credentials: Credentials,
        settings: SyncSettings,
        market: Arc<dyn MarketData>,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            credentials,
            settings,
            market,
            generator,
            store,
        }
    }

    /// Run one sync for `raw_ticker`.
    ///
    /// Credentials are validated first, then the ticker; both fail before any
    /// collaborator is called. When quote and news both fail, the quote error is reported.
    pub async fn run(&self, raw_ticker: &str) -> Result<SyncOutcome, SyncError> {
        let started = Instant::now();
        let span = tracing::info_span!(
            target: "sync",
            "sync",
            ticker = %raw_ticker.trim(),
            market = self.market.name(),
            generator = self.generator.provider_name(),
        );
        let res = self.run_inner(raw_ticker).instrument(span).await;

        histogram!("sync_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
        match &res {
            Ok(outcome) => {
                counter!("sync_runs_total", "outcome" => outcome.label()).increment(1);
            }
            Err(e) => {
                counter!("sync_runs_total", "outcome" => "failed").increment(1);
                if let Some(step) = e.step() {
                    counter!("sync_step_failures_total", "step" => step.as_str()).increment(1);
                }
            }
        }
        res
    }

    async fn run_inner(&self, raw_ticker: &str) -> Result<SyncOutcome, SyncError> {
        self.credentials.validate()?;
        let ticker = normalize_ticker(raw_ticker)
            .ok_or_else(|| SyncError::InvalidTicker("ticker is required".to_string()))?;

        let mut trace = PhaseTrace::default();
        let res = self.drive(&ticker, &mut trace).await;
        let phase = trace.current();
        match &res {
            Ok(outcome) => info!(target: "sync", %ticker, %phase, outcome = outcome.label(), "sync finished"),
            Err(e) => warn!(target: "sync", %ticker, %phase, error = %e, "sync failed"),
        }
        res
    }

    async fn drive(&self, ticker: &str, trace: &mut PhaseTrace) -> Result<SyncOutcome, SyncError> {
        // The two fetches are independent; run them together, report quote first.
        trace.enter(SyncPhase::FetchingQuote);
        trace.enter(SyncPhase::FetchingNews);
        let (from, to) = news_window(Utc::now());
        let (quote, news) = tokio::join!(
            self.step(SyncStep::Quote, self.market.get_quote(ticker)),
            self.step(SyncStep::News, self.market.get_news(ticker, from, to)),
        );
        let quote = quote.inspect_err(|_| trace.enter(SyncPhase::Failed(SyncStep::Quote)))?;
        let news = news.inspect_err(|_| trace.enter(SyncPhase::Failed(SyncStep::News)))?;

        let Some(digest) = build_digest(&news) else {
            trace.enter(SyncPhase::NoNewsFound);
            return Ok(SyncOutcome::NoNewsFound {
                ticker: ticker.to_string(),
            });
        };
        debug!(target: "sync", items = news.len(), digest_id = %fingerprint(&digest), "digest built");

        trace.enter(SyncPhase::Summarizing);
        let prompt = summary_prompt(ticker, &digest);
        let summary = self
            .step(SyncStep::Summarize, self.generator.summarize(&prompt))
            .await
            .and_then(|s| {
                if s.trim().is_empty() {
                    Err(SyncError::at(SyncStep::Summarize, "empty summary"))
                } else {
                    Ok(s)
                }
            })
            .inspect_err(|_| trace.enter(SyncPhase::Failed(SyncStep::Summarize)))?;

        trace.enter(SyncPhase::Embedding);
        let dims = self.settings.embedding_dimensions;
        let embedding = self
            .step(SyncStep::Embed, self.generator.embed(&summary, dims))
            .await
            .and_then(|v| {
                if v.len() == dims as usize {
                    Ok(v)
                } else {
                    Err(SyncError::at(
                        SyncStep::Embed,
                        format!("embedding has {} dimensions, expected {dims}", v.len()),
                    ))
                }
            })
            .inspect_err(|_| trace.enter(SyncPhase::Failed(SyncStep::Embed)))?;

        trace.enter(SyncPhase::Persisting);
        let row = NewRecord::new(ticker, summary, embedding, &quote);
        let saved = self
            .step(SyncStep::Persist, self.store.insert(&row))
            .await
            .inspect_err(|_| trace.enter(SyncPhase::Failed(SyncStep::Persist)))?;

        trace.enter(SyncPhase::Done);
        Ok(SyncOutcome::Done(SyncReport {
            ticker: ticker.to_string(),
            summary: row.summary,
            quote,
            record_id: saved.id,
            created_at: saved.created_at,
        }))
    }

    /// Bound one external call by the step timeout and tag any failure with `step`.
    async fn step<T, F>(&self, step: SyncStep, fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let limit = self.settings.step_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(SyncError::at(step, format!("{e:#}"))),
            Err(_) => Err(SyncError::at(
                step,
                format!("timed out after {}s", limit.as_secs()),
            )),
        }
    }
}

/// Phases entered by one run, in order.
#[derive(Debug, Default)]
struct PhaseTrace {
    phases: Vec<SyncPhase>,
}

impl PhaseTrace {
    fn current(&self) -> SyncPhase {
        self.phases.last().copied().unwrap_or(SyncPhase::Idle)
    }

    fn enter(&mut self, next: SyncPhase) {
        debug!(target: "sync", from = %self.current(), to = %next, "phase");
        self.phases.push(next);
    }
}

/// Short SHA-256 prefix used to correlate log lines without logging raw text.
pub(crate) fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
