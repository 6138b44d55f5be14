// src/model.rs
//! Record and quote types shared by the pipeline, the store and the reconciler.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Uppercase + trim. Returns `None` for blank input.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_ascii_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub change: f64,
    pub percent_change: f64,
}

/// One provider news item. Only the headline is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Unix seconds, as reported by the provider.
    #[serde(default)]
    pub datetime: Option<i64>,
}

/// Row as sent to the store. `id` and `created_at` are assigned server-side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRecord {
    pub ticker: String,
    pub summary: String,
    pub embedding: Vec<f32>,
    pub price: Option<f64>,
    pub price_change: Option<f64>,
    pub percent_change: Option<f64>,
}

impl NewRecord {
    pub fn new(ticker: &str, summary: String, embedding: Vec<f32>, quote: &Quote) -> Self {
        Self {
            ticker: ticker.to_string(),
            summary,
            embedding,
            price: Some(quote.price),
            price_change: Some(quote.change),
            percent_change: Some(quote.percent_change),
        }
    }
}

/// Persisted record as read back by consumers. The embedding is never read back.
///
/// Price fields are optional: older rows were written before the quote columns existed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub id: i64,
    pub ticker: String,
    pub summary: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub price_change: Option<f64>,
    #[serde(default)]
    pub percent_change: Option<f64>,
    #[serde(deserialize_with = "deserialize_created_at")]
    pub created_at: DateTime<Utc>,
}

impl NewsRecord {
    /// Decode a raw row (REST response or change-feed payload) and check the
    /// fields every consumer relies on.
    pub fn from_row(row: serde_json::Value) -> anyhow::Result<Self> {
        let rec: NewsRecord = serde_json::from_value(row)?;
        if rec.ticker.trim().is_empty() {
            anyhow::bail!("record {} has an empty ticker", rec.id);
        }
        if rec.summary.trim().is_empty() {
            anyhow::bail!("record {} has an empty summary", rec.id);
        }
        Ok(rec)
    }
}

/// Accepts RFC 3339 (`2026-01-19T10:00:00.123+00:00`) and naive timestamps
/// (`2026-01-19T10:00:00.123456`, treated as UTC) as emitted by the change feed.
fn deserialize_created_at<'de, D>(de: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(de)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("bad timestamp: {raw}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Postgres text form uses a space separator and a short offset ("+00").
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|n| n.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn ticker_is_trimmed_and_uppercased() {
        assert_eq!(normalize_ticker("  aapl "), Some("AAPL".to_string()));
        assert_eq!(normalize_ticker("   "), None);
    }

    #[test]
    fn legacy_rows_without_price_fields_decode() {
        let rec = NewsRecord::from_row(json!({
            "id": 7,
            "ticker": "MSFT",
            "summary": "Cloud growth.",
            "created_at": "2026-01-19T10:00:00+00:00"
        }))
        .unwrap();
        assert_eq!(rec.price, None);
        assert_eq!(rec.percent_change, None);
        assert_eq!(
            rec.created_at,
            Utc.with_ymd_and_hms(2026, 1, 19, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn naive_and_postgres_timestamps_are_utc() {
        let a = parse_timestamp("2026-01-19T10:00:00.123456").unwrap();
        let b = parse_timestamp("2026-01-19 10:00:00.123456+00").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rows_missing_required_fields_are_rejected() {
        assert!(NewsRecord::from_row(json!({"id": 1, "ticker": "AAPL"})).is_err());
        assert!(NewsRecord::from_row(json!({
            "id": 1, "ticker": "AAPL", "summary": "  ", "created_at": "2026-01-19T10:00:00Z"
        }))
        .is_err());
    }
}
