// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /sync  (success, no news, step failure, configuration, bad input)
// - GET /news/{ticker}

mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use serde_json::Value as Json;
use http::{Request, StatusCode};
use shuttle_axum::axum::{
    body::{self, Body},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use common::{full_credentials, orchestrator, FakeGenerator, FakeMarket};
use ticker_news_sync::config::Credentials;
use ticker_news_sync::store::memory::MemoryStore;
use ticker_news_sync::{router, AppState};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

fn app_with(creds: Credentials, market: FakeMarket, store: Arc<MemoryStore>) -> Router {
    let market = Arc::new(market);
    let generator = Arc::new(FakeGenerator::ok("Apple had a strong quarter."));
    let orch = orchestrator(creds, &market, &generator, &store);
    router(AppState {
        orchestrator: Arc::new(orch),
        store,
    })
}

fn post_sync(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/sync")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build POST /sync")
}

async fn read_json(resp: shuttle_axum::axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    serde_json::from_slice(&bytes).expect("parse json")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = app_with(full_credentials(), FakeMarket::ok(&["A"]), Arc::new(MemoryStore::new()));

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "ok");
}

#[tokio::test]
async fn api_sync_returns_summary_price_and_change() {
    let store = Arc::new(MemoryStore::new());
    let app = app_with(full_credentials(), FakeMarket::ok(&["A", "B"]), store.clone());

    let resp = app
        .oneshot(post_sync(&json!({ "ticker": "aapl" }).to_string()))
        .await
        .expect("oneshot /sync");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = read_json(resp).await;
    assert_eq!(
        v,
        json!({
            "summary": "Apple had a strong quarter.",
            "price": 189.5,
            "change": -1.25
        })
    );
    assert_eq!(store.rows().len(), 1);
}

#[tokio::test]
async fn api_sync_without_news_is_404() {
    let store = Arc::new(MemoryStore::new());
    let app = app_with(full_credentials(), FakeMarket::ok(&[]), store.clone());

    let resp = app
        .oneshot(post_sync(r#"{"ticker":"AAPL"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(resp).await, json!({ "message": "No news found" }));
    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn api_sync_step_failure_names_the_step() {
    let market = FakeMarket::new(Err("finnhub quote returned 429".into()), Ok(vec![]));
    let app = app_with(full_credentials(), market, Arc::new(MemoryStore::new()));

    let resp = app.oneshot(post_sync(r#"{"ticker":"AAPL"}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let v = read_json(resp).await;
    let msg = v["error"].as_str().expect("error string");
    assert!(msg.starts_with("quote step failed"), "got {msg}");
    assert!(msg.contains("429"));
}

#[tokio::test]
async fn api_sync_missing_configuration_is_reported() {
    let creds = Credentials {
        gemini_api_key: None,
        ..full_credentials()
    };
    let app = app_with(creds, FakeMarket::ok(&["A"]), Arc::new(MemoryStore::new()));

    let resp = app.oneshot(post_sync(r#"{"ticker":"AAPL"}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let v = read_json(resp).await;
    let msg = v["error"].as_str().unwrap();
    assert!(msg.contains("configuration error"), "got {msg}");
    assert!(msg.contains("GEMINI_API_KEY"));
}

#[tokio::test]
async fn api_sync_rejects_missing_ticker_and_bad_json() {
    let app = app_with(full_credentials(), FakeMarket::ok(&["A"]), Arc::new(MemoryStore::new()));

    let resp = app.clone().oneshot(post_sync("{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(read_json(resp).await["error"].is_string());

    let resp = app.oneshot(post_sync("not json")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(read_json(resp).await["error"].is_string());
}

#[tokio::test]
async fn api_news_lists_newest_first() {
    let store = Arc::new(MemoryStore::new());
    store.seed("AAPL", "older", Utc.with_ymd_and_hms(2026, 1, 19, 9, 0, 0).unwrap());
    store.seed("AAPL", "newer", Utc.with_ymd_and_hms(2026, 1, 19, 10, 0, 0).unwrap());
    store.seed("MSFT", "other", Utc.with_ymd_and_hms(2026, 1, 19, 11, 0, 0).unwrap());
    let app = app_with(full_credentials(), FakeMarket::ok(&["A"]), store);

    let req = Request::builder()
        .method("GET")
        .uri("/news/aapl")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let v = read_json(resp).await;
    let summaries: Vec<&str> = v
        .as_array()
        .expect("array")
        .iter()
        .map(|r| r["summary"].as_str().unwrap())
        .collect();
    assert_eq!(summaries, vec!["newer", "older"]);
    // Legacy rows carry no price fields.
    assert!(v[0]["price"].is_null());
}
