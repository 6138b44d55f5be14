// src/store/supabase.rs
//! PostgREST access to the records table.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use super::RecordStore;
use crate::model::{NewRecord, NewsRecord};

/// Columns read back by consumers; the embedding is deliberately not selected.
const SELECT_COLUMNS: &str = "id,ticker,summary,price,price_change,percent_change,created_at";

#[derive(Clone)]
pub struct SupabaseStore {
    http: Client,
    url: String,
    key: String,
    table: String,
}

impl SupabaseStore {
    pub fn new(url: &str, key: String, table: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent("ticker-news-sync/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .context("building supabase http client")?;
        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            key,
            table: table.to_string(),
        })
    }

    /// Project base URL (`https://<ref>.supabase.co`).
    pub fn project_url(&self) -> &str {
        &self.url
    }

    pub fn api_key(&self) -> &str {
        &self.key
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }

    fn authed(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        rb.header("apikey", &self.key).bearer_auth(&self.key)
    }
}

fn decode_rows(body: serde_json::Value) -> Result<Vec<NewsRecord>> {
    let rows = match body {
        serde_json::Value::Array(rows) => rows,
        other => bail!("expected a row array, got {other}"),
    };
    rows.into_iter().map(NewsRecord::from_row).collect()
}

fn decode_inserted(body: serde_json::Value) -> Result<NewsRecord> {
    decode_rows(body)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("supabase insert returned no row"))
}

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn insert(&self, row: &NewRecord) -> Result<NewsRecord> {
        let resp = self
            .authed(self.http.post(self.endpoint()))
            .query(&[("select", SELECT_COLUMNS)])
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await
            .context("supabase insert")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("supabase insert returned {status}: {}", body.trim());
        }
        // 2xx: the row is committed from here on, whatever the body looks like.
        let decoded = match resp.json::<serde_json::Value>().await {
            Ok(body) => decode_inserted(body),
            Err(e) => Err(anyhow::Error::new(e)),
        };
        decoded.map_err(|e| {
            warn!(target: "store", table = %self.table, error = %format!("{e:#}"), "insert committed but returned row unreadable");
            e.context("insert committed (row was written) but the returned row could not be read")
        })
    }

    async fn query(&self, ticker: &str) -> Result<Vec<NewsRecord>> {
        let filter = format!("eq.{ticker}");
        let resp = self
            .authed(self.http.get(self.endpoint()))
            .query(&[
                ("select", SELECT_COLUMNS),
                ("ticker", filter.as_str()),
                ("order", "created_at.desc"),
            ])
            .send()
            .await
            .context("supabase query")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("supabase query returned {status}: {}", body.trim());
        }
        let body: serde_json::Value = resp.json().await.context("supabase query body")?;
        decode_rows(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rows_decode_in_server_order() {
        let rows = decode_rows(json!([
            {"id": 2, "ticker": "AAPL", "summary": "b", "price": 1.0, "price_change": 0.1,
             "percent_change": 0.2, "created_at": "2026-01-19T10:00:00+00:00"},
            {"id": 1, "ticker": "AAPL", "summary": "a", "created_at": "2026-01-19T09:00:00+00:00"}
        ]))
        .unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(rows[1].price, None);
    }

    #[test]
    fn error_object_is_not_rows() {
        assert!(decode_rows(json!({"code": "42P01", "message": "relation does not exist"})).is_err());
    }

    #[test]
    fn connection_parts_feed_the_realtime_client() {
        let store = SupabaseStore::new("https://ref.supabase.co/", "k".into(), "ticker_news").unwrap();
        assert_eq!(store.project_url(), "https://ref.supabase.co");
        assert_eq!(store.api_key(), "k");
        assert_eq!(store.table(), "ticker_news");
    }

    #[test]
    fn inserted_row_is_the_first_returned() {
        let rec = decode_inserted(json!([
            {"id": 7, "ticker": "AAPL", "summary": "s", "created_at": "2026-01-19T10:00:00Z"}
        ]))
        .unwrap();
        assert_eq!(rec.id, 7);
    }

    #[test]
    fn unreadable_insert_reply_is_an_error() {
        assert!(decode_inserted(json!([])).is_err());
        assert!(decode_inserted(json!([{"id": 7, "ticker": "AAPL"}])).is_err());
    }

    #[test]
    fn insert_payload_uses_snake_case_columns() {
        let row = NewRecord {
            ticker: "AAPL".into(),
            summary: "s".into(),
            embedding: vec![0.5, 0.25],
            price: Some(10.0),
            price_change: Some(-1.0),
            percent_change: Some(-9.09),
        };
        let v = serde_json::to_value(&row).unwrap();
        assert_eq!(v["price_change"], -1.0);
        assert_eq!(v["embedding"], json!([0.5, 0.25]));
        assert!(v.get("id").is_none());
    }
}
