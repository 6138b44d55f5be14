// src/market/mod.rs
//! Market-data collaborator: quote + company news, and the headline digest.

pub mod finnhub;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::model::{NewsItem, Quote};

/// Trailing news window, ending "now".
pub const NEWS_LOOKBACK_DAYS: i64 = 30;
/// Headlines that make it into the digest.
pub const DIGEST_HEADLINES: usize = 3;
pub const DIGEST_SEPARATOR: &str = ". ";

#[async_trait::async_trait]
pub trait MarketData: Send + Sync {
    async fn get_quote(&self, ticker: &str) -> Result<Quote>;
    /// Items in provider order.
    async fn get_news(&self, ticker: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<NewsItem>>;
    fn name(&self) -> &'static str;
}

/// `(now - 30d, now)` as calendar dates (UTC). Computed per call.
pub fn news_window(now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
    let to = now.date_naive();
    let from = (now - Duration::days(NEWS_LOOKBACK_DAYS)).date_naive();
    (from, to)
}

/// Decode entities, strip tags, collapse whitespace.
pub fn normalize_headline(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// First [`DIGEST_HEADLINES`] items, normalized headlines joined with [`DIGEST_SEPARATOR`].
///
/// Positions are kept: a blank headline still contributes its separator (`A. . C`).
/// `None` when there are no items or none of them carries headline text.
pub fn build_digest(items: &[NewsItem]) -> Option<String> {
    let parts: Vec<String> = items
        .iter()
        .take(DIGEST_HEADLINES)
        .map(|it| normalize_headline(&it.headline))
        .collect();
    if parts.iter().all(|h| h.is_empty()) {
        None
    } else {
        Some(parts.join(DIGEST_SEPARATOR))
    }
}
