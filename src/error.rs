// src/error.rs
//! Error taxonomy for one sync invocation.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Pipeline step a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    Quote,
    News,
    Summarize,
    Embed,
    Persist,
}

impl SyncStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStep::Quote => "quote",
            SyncStep::News => "news",
            SyncStep::Summarize => "summarize",
            SyncStep::Embed => "embed",
            SyncStep::Persist => "persist",
        }
    }
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly one of these is surfaced per failed sync. `NoNewsFound` is not an error;
/// see [`crate::sync::SyncOutcome`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Missing or blank credentials. Checked before anything touches the network.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid ticker: {0}")]
    InvalidTicker(String),

    #[error("quote step failed: {0}")]
    QuoteFetch(String),

    #[error("news step failed: {0}")]
    NewsFetch(String),

    #[error("summarize step failed: {0}")]
    Summarization(String),

    #[error("embed step failed: {0}")]
    Embedding(String),

    #[error("persist step failed: {0}")]
    Persistence(String),
}

impl SyncError {
    /// Build the step-tagged variant for `step`.
    pub fn at(step: SyncStep, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match step {
            SyncStep::Quote => SyncError::QuoteFetch(detail),
            SyncStep::News => SyncError::NewsFetch(detail),
            SyncStep::Summarize => SyncError::Summarization(detail),
            SyncStep::Embed => SyncError::Embedding(detail),
            SyncStep::Persist => SyncError::Persistence(detail),
        }
    }

    /// Originating step; `None` for precondition failures.
    pub fn step(&self) -> Option<SyncStep> {
        match self {
            SyncError::Configuration(_) | SyncError::InvalidTicker(_) => None,
            SyncError::QuoteFetch(_) => Some(SyncStep::Quote),
            SyncError::NewsFetch(_) => Some(SyncStep::News),
            SyncError::Summarization(_) => Some(SyncStep::Summarize),
            SyncError::Embedding(_) => Some(SyncStep::Embed),
            SyncError::Persistence(_) => Some(SyncStep::Persist),
        }
    }

    pub fn is_precondition(&self) -> bool {
        self.step().is_none()
    }
}
