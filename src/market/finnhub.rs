// src/market/finnhub.rs
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::MarketData;
use crate::model::{NewsItem, Quote};

const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

#[derive(Debug, Deserialize)]
struct QuoteResp {
    /// current price
    c: Option<f64>,
    /// change
    d: Option<f64>,
    /// percent change
    dp: Option<f64>,
    /// quote timestamp
    #[serde(default)]
    t: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct NewsResp {
    headline: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    datetime: Option<i64>,
}

pub struct FinnhubClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl FinnhubClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent("ticker-news-sync/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .context("building finnhub http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<serde_json::Value> {
        let resp = self
            .http
            .get(format!("{}/{}", self.base_url, path))
            .query(query)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("finnhub GET {path}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("finnhub {path} returned {status}: {}", body.trim());
        }
        resp.json().await.with_context(|| format!("finnhub {path} body"))
    }
}

/// Validate a `/quote` payload. Unknown symbols come back as all zeros / nulls.
pub(crate) fn parse_quote(body: serde_json::Value) -> Result<Quote> {
    let q: QuoteResp = serde_json::from_value(body).context("decoding quote payload")?;
    if q.c == Some(0.0) && q.t.unwrap_or(0) == 0 {
        bail!("no quote data (unknown symbol?)");
    }
    let price = q.c.ok_or_else(|| anyhow!("quote payload missing field `c`"))?;
    let change = q.d.ok_or_else(|| anyhow!("quote payload missing field `d`"))?;
    let percent_change = q.dp.ok_or_else(|| anyhow!("quote payload missing field `dp`"))?;
    Ok(Quote {
        price,
        change,
        percent_change,
    })
}

/// Validate a `/company-news` payload: an array of objects that each carry a headline.
pub(crate) fn parse_news(body: serde_json::Value) -> Result<Vec<NewsItem>> {
    if !body.is_array() {
        bail!("news payload is not an array: {}", truncate(&body.to_string(), 120));
    }
    let raw: Vec<NewsResp> = serde_json::from_value(body).context("decoding news payload")?;
    raw.into_iter()
        .enumerate()
        .map(|(i, r)| {
            let headline = r
                .headline
                .ok_or_else(|| anyhow!("news item {i} missing field `headline`"))?;
            Ok(NewsItem {
                headline,
                source: r.source,
                url: r.url,
                datetime: r.datetime,
            })
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[async_trait]
impl MarketData for FinnhubClient {
    async fn get_quote(&self, ticker: &str) -> Result<Quote> {
        let body = self.get_json("quote", &[("symbol", ticker)]).await?;
        parse_quote(body)
    }

    async fn get_news(&self, ticker: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<NewsItem>> {
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();
        let body = self
            .get_json(
                "company-news",
                &[("symbol", ticker), ("from", from.as_str()), ("to", to.as_str())],
            )
            .await?;
        let items = parse_news(body)?;
        tracing::debug!(target: "market", provider = "finnhub", ticker, count = items.len(), "news fetched");
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "finnhub"
    }
}
