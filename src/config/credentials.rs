// src/config/credentials.rs
use std::env;

use crate::error::SyncError;

pub const ENV_FINNHUB_API_KEY: &str = "FINNHUB_API_KEY";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";

/// Upstream secrets, read once from the environment and injected into the
/// orchestrator and clients. Blank values are treated as absent.
#[derive(Clone, Default)]
pub struct Credentials {
    pub finnhub_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
}

// Keys stay out of logs: only presence + length.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn shown(v: &Option<String>) -> String {
            v.as_ref()
                .map(|s| format!("<{} chars>", s.len()))
                .unwrap_or_else(|| "<missing>".into())
        }
        f.debug_struct("Credentials")
            .field("finnhub_api_key", &shown(&self.finnhub_api_key))
            .field("gemini_api_key", &shown(&self.gemini_api_key))
            .field("supabase_url", &self.supabase_url)
            .field("supabase_key", &shown(&self.supabase_key))
            .finish()
    }
}

fn read_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Credentials {
    /// Server-side credentials (service-role key for inserts).
    pub fn from_env() -> Self {
        Self {
            finnhub_api_key: read_env(ENV_FINNHUB_API_KEY),
            gemini_api_key: read_env(ENV_GEMINI_API_KEY),
            supabase_url: read_env(ENV_SUPABASE_URL),
            supabase_key: read_env(ENV_SUPABASE_SERVICE_ROLE_KEY),
        }
    }

    /// Read-only client credentials: prefers the anon key, falls back to the service key.
    pub fn store_from_env() -> Self {
        Self {
            supabase_url: read_env(ENV_SUPABASE_URL),
            supabase_key: read_env(ENV_SUPABASE_ANON_KEY)
                .or_else(|| read_env(ENV_SUPABASE_SERVICE_ROLE_KEY)),
            ..Self::default()
        }
    }

    /// Names of every required variable that is missing.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.finnhub_api_key.is_none() {
            out.push(ENV_FINNHUB_API_KEY);
        }
        if self.gemini_api_key.is_none() {
            out.push(ENV_GEMINI_API_KEY);
        }
        if self.supabase_url.is_none() {
            out.push(ENV_SUPABASE_URL);
        }
        if self.supabase_key.is_none() {
            out.push(ENV_SUPABASE_SERVICE_ROLE_KEY);
        }
        out
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Configuration(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }

    /// Store-only check used by the watcher.
    pub fn validate_store(&self) -> Result<(), SyncError> {
        match (&self.supabase_url, &self.supabase_key) {
            (Some(_), Some(_)) => Ok(()),
            (None, _) => Err(SyncError::Configuration(format!("missing {ENV_SUPABASE_URL}"))),
            (_, None) => Err(SyncError::Configuration(format!(
                "missing {ENV_SUPABASE_ANON_KEY} or {ENV_SUPABASE_SERVICE_ROLE_KEY}"
            ))),
        }
    }
}
