// tests/common/mod.rs
// Call-counting fakes shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use tokio::sync::mpsc;

use ticker_news_sync::config::{Credentials, SyncSettings};
use ticker_news_sync::genai::TextGenerator;
use ticker_news_sync::market::MarketData;
use ticker_news_sync::model::{NewsItem, Quote};
use ticker_news_sync::store::memory::MemoryStore;
use ticker_news_sync::store::{ChangeFeed, Subscription};
use ticker_news_sync::SyncOrchestrator;

pub fn full_credentials() -> Credentials {
    Credentials {
        finnhub_api_key: Some("finnhub-test".into()),
        gemini_api_key: Some("gemini-test".into()),
        supabase_url: Some("http://127.0.0.1:54321".into()),
        supabase_key: Some("service-test".into()),
    }
}

pub fn quote() -> Quote {
    Quote {
        price: 189.5,
        change: -1.25,
        percent_change: -0.655,
    }
}

pub fn headlines(hs: &[&str]) -> Vec<NewsItem> {
    hs.iter()
        .map(|h| NewsItem {
            headline: h.to_string(),
            source: Some("Reuters".into()),
            url: None,
            datetime: None,
        })
        .collect()
}

pub struct FakeMarket {
    pub quote: Result<Quote, String>,
    pub news: Result<Vec<NewsItem>, String>,
    pub quote_delay: Option<Duration>,
    pub quote_calls: AtomicUsize,
    pub news_calls: AtomicUsize,
    pub tickers: Mutex<Vec<String>>,
}

impl FakeMarket {
    pub fn new(quote: Result<Quote, String>, news: Result<Vec<NewsItem>, String>) -> Self {
        Self {
            quote,
            news,
            quote_delay: None,
            quote_calls: AtomicUsize::new(0),
            news_calls: AtomicUsize::new(0),
            tickers: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(hs: &[&str]) -> Self {
        Self::new(Ok(quote()), Ok(headlines(hs)))
    }

    pub fn calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst) + self.news_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MarketData for FakeMarket {
    async fn get_quote(&self, ticker: &str) -> Result<Quote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.tickers.lock().unwrap().push(ticker.to_string());
        if let Some(d) = self.quote_delay {
            tokio::time::sleep(d).await;
        }
        self.quote.clone().map_err(|e| anyhow!(e))
    }

    async fn get_news(&self, ticker: &str, _from: NaiveDate, _to: NaiveDate) -> Result<Vec<NewsItem>> {
        self.news_calls.fetch_add(1, Ordering::SeqCst);
        self.tickers.lock().unwrap().push(ticker.to_string());
        self.news.clone().map_err(|e| anyhow!(e))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

pub struct FakeGenerator {
    pub summary: Result<String, String>,
    pub embed_error: Option<String>,
    /// Overrides the returned vector length; `None` honours the requested size.
    pub embed_len: Option<usize>,
    pub prompts: Mutex<Vec<String>>,
    pub embed_inputs: Mutex<Vec<(String, u32)>>,
    pub summarize_calls: AtomicUsize,
    pub embed_calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn ok(summary: &str) -> Self {
        Self {
            summary: Ok(summary.to_string()),
            embed_error: None,
            embed_len: None,
            prompts: Mutex::new(Vec::new()),
            embed_inputs: Mutex::new(Vec::new()),
            summarize_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
        }
    }

    pub fn summarize_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TextGenerator for FakeGenerator {
    async fn summarize(&self, prompt: &str) -> Result<String> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.summary.clone().map_err(|e| anyhow!(e))
    }

    async fn embed(&self, text: &str, dimensions: u32) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.embed_inputs
            .lock()
            .unwrap()
            .push((text.to_string(), dimensions));
        if let Some(e) = &self.embed_error {
            return Err(anyhow!(e.clone()));
        }
        Ok(vec![0.25; self.embed_len.unwrap_or(dimensions as usize)])
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

pub fn orchestrator(
    creds: Credentials,
    market: &Arc<FakeMarket>,
    generator: &Arc<FakeGenerator>,
    store: &Arc<MemoryStore>,
) -> SyncOrchestrator {
    SyncOrchestrator::new(
        creds,
        SyncSettings::default(),
        market.clone(),
        generator.clone(),
        store.clone(),
    )
}

/// Change feed whose events are pushed by the test.
#[derive(Default)]
pub struct ManualFeed {
    pub senders: Mutex<Vec<(String, mpsc::Sender<serde_json::Value>)>>,
    pub opened: Mutex<Vec<String>>,
}

impl ManualFeed {
    /// Sender of the most recent subscription for `ticker`.
    pub fn sender(&self, ticker: &str) -> Option<mpsc::Sender<serde_json::Value>> {
        self.senders
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(t, _)| t == ticker)
            .map(|(_, tx)| tx.clone())
    }

    /// Subscriptions opened so far for `ticker`, including closed ones.
    pub fn subscriptions(&self, ticker: &str) -> usize {
        self.opened.lock().unwrap().iter().filter(|t| *t == ticker).count()
    }

    /// Drop every sender, ending all open streams as a socket close would.
    pub fn close_all(&self) {
        self.senders.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl ChangeFeed for ManualFeed {
    async fn subscribe(&self, ticker: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(64);
        self.senders.lock().unwrap().push((ticker.to_string(), tx));
        self.opened.lock().unwrap().push(ticker.to_string());
        Ok(Subscription::new(rx, None))
    }
}
