// src/config/settings.rs
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

pub const DEFAULT_SYNC_CONFIG_PATH: &str = "config/sync.toml";
pub const ENV_SYNC_CONFIG_PATH: &str = "SYNC_CONFIG_PATH";

fn default_summary_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}
fn default_embedding_dimensions() -> u32 {
    768
}
fn default_step_timeout_secs() -> u64 {
    15
}
fn default_table() -> String {
    "ticker_news".to_string()
}

/// Tunables for the sync pipeline. Headline count, separator and lookback are
/// fixed constants in `market`, not settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_summary_model")]
    pub summary_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Must stay constant across the corpus; downstream vector search depends on it.
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    /// Per external call. Clamped to 1..=120.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            summary_model: default_summary_model(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            step_timeout_secs: default_step_timeout_secs(),
            table: default_table(),
        }
    }
}

impl SyncSettings {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: SyncSettings = toml::from_str(s).context("parsing sync settings")?;
        Ok(cfg.sanitized())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading sync settings from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// $SYNC_CONFIG_PATH, then `config/sync.toml`; defaults when neither exists.
    pub fn load_default() -> anyhow::Result<Self> {
        if let Ok(p) = std::env::var(ENV_SYNC_CONFIG_PATH) {
            return Self::load_from_file(p);
        }
        let p = Path::new(DEFAULT_SYNC_CONFIG_PATH);
        if p.exists() {
            return Self::load_from_file(p);
        }
        Ok(Self::default())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    fn sanitized(mut self) -> Self {
        if self.summary_model.trim().is_empty() {
            self.summary_model = default_summary_model();
        }
        if self.embedding_model.trim().is_empty() {
            self.embedding_model = default_embedding_model();
        }
        if self.embedding_dimensions == 0 {
            self.embedding_dimensions = default_embedding_dimensions();
        }
        self.step_timeout_secs = self.step_timeout_secs.clamp(1, 120);
        if self.table.trim().is_empty() {
            self.table = default_table();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let s = SyncSettings::from_toml_str("").unwrap();
        assert_eq!(s, SyncSettings::default());
        assert_eq!(s.embedding_dimensions, 768);
    }

    #[test]
    fn invalid_values_fall_back() {
        let s = SyncSettings::from_toml_str(
            r#"
            summary_model = " "
            embedding_dimensions = 0
            step_timeout_secs = 900
            "#,
        )
        .unwrap();
        assert_eq!(s.summary_model, "gemini-1.5-flash");
        assert_eq!(s.embedding_dimensions, 768);
        assert_eq!(s.step_timeout_secs, 120);
    }

    #[test]
    fn overrides_are_kept() {
        let s = SyncSettings::from_toml_str(
            "embedding_dimensions = 256\ntable = \"news_v2\"\n",
        )
        .unwrap();
        assert_eq!(s.embedding_dimensions, 256);
        assert_eq!(s.table, "news_v2");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(SyncSettings::from_toml_str("embedding_dimensions = \"lots\"").is_err());
    }
}
