// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health, GET /api/ping
// - GET /api/news (filters, Cache-Control, page shape)
// - GET /api/stats
// - POST /api/refresh (success and 502)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use haber_okuyoruz::config::app::QueryCfg;
use haber_okuyoruz::error::FetchError;
use haber_okuyoruz::ingest::types::{FeedFetcher, FeedSource};
use haber_okuyoruz::model::Category;
use haber_okuyoruz::store::NewsStore;
use haber_okuyoruz::{router, Aggregator, AppState};

const BODY_LIMIT: usize = 1024 * 1024;
const EKONOMI: &str = include_str!("fixtures/ekonomi.xml");
const SPOR: &str = include_str!("fixtures/spor.xml");

struct Feeds {
    up: AtomicBool,
}

#[async_trait]
impl FeedFetcher for Feeds {
    async fn fetch(&self, source: &FeedSource) -> Result<String, FetchError> {
        if !self.up.load(Ordering::SeqCst) {
            return Err(FetchError::Network("down".into()));
        }
        match source.name.as_str() {
            "Ekonomi" => Ok(EKONOMI.to_string()),
            "Spor" => Ok(SPOR.to_string()),
            _ => Err(FetchError::Status(404)),
        }
    }
}

fn test_app(store: Option<Arc<NewsStore>>) -> (Router, Arc<Feeds>) {
    let feeds = Arc::new(Feeds {
        up: AtomicBool::new(true),
    });
    let sources = vec![
        FeedSource::new("Ekonomi", "https://ekonomi.test/rss", Some(Category::Ekonomi)),
        FeedSource::new("Spor", "https://spor.test/rss", Some(Category::Spor)),
    ];
    let mut agg = Aggregator::new(sources, feeds.clone()).with_cache_ttl(Duration::from_secs(60));
    if let Some(s) = store {
        agg = agg.with_store(s);
    }
    let state = AppState::new(Arc::new(agg), QueryCfg::default());
    (router(state), feeds)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = test_app(None);
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    assert_eq!(String::from_utf8_lossy(&bytes).trim(), "ok");
}

#[tokio::test]
async fn ping_reports_status() {
    let (app, _) = test_app(None);
    let (status, v) = get_json(&app, "/api/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "ok");
    assert_eq!(v["message"], "Sunucu aktif");
    assert!(v["timestamp"].is_string());
}

#[tokio::test]
async fn news_returns_page_with_no_store_header() {
    let (app, _) = test_app(None);
    let req = Request::builder()
        .uri("/api/news")
        .body(Body::empty())
        .expect("build GET /api/news");
    let resp = app.oneshot(req).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
        Some(&b"no-store"[..])
    );
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v: Json = serde_json::from_slice(&bytes).expect("json");

    assert_eq!(v["total"], 3);
    assert_eq!(v["items"].as_array().map(Vec::len), Some(3));
    assert_eq!(v["sources"], serde_json::json!(["Ekonomi", "Spor"]));
    assert_eq!(v["categories"].as_array().map(Vec::len), Some(Category::ALL.len()));
    assert!(v["updatedAt"].is_string());
    let first = &v["items"][0];
    assert!(first["publishedAt"].is_string());
    assert!(first["sources"].is_array());
}

#[tokio::test]
async fn news_query_filters_and_pages() {
    let (app, _) = test_app(None);

    let (_, v) = get_json(&app, "/api/news?q=DERB%C4%B0").await;
    assert_eq!(v["total"], 1);
    assert_eq!(v["items"][0]["link"], "https://spor.test/derbi");

    let (_, v) = get_json(&app, "/api/news?source=Spor").await;
    // The merged story lists Spor among its sources.
    assert_eq!(v["total"], 2);

    let (_, v) = get_json(&app, "/api/news?limit=1&offset=1&sort=oldest").await;
    assert_eq!(v["total"], 3);
    assert_eq!(v["items"].as_array().map(Vec::len), Some(1));

    let (_, v) = get_json(&app, "/api/news?category=bilinmeyen").await;
    assert_eq!(v["total"], 0);
}

#[tokio::test]
async fn bad_query_value_is_rejected() {
    let (app, _) = test_app(None);
    let req = Request::builder()
        .uri("/api/news?window=decade")
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_count_persisted_items() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(NewsStore::new(dir.path().join("news.json")));
    let (app, _) = test_app(Some(store));

    // Populate through a read.
    let _ = get_json(&app, "/api/news").await;
    let (status, v) = get_json(&app, "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["total"], 3);
    assert_eq!(v["bySource"]["Ekonomi"], 2);
    assert_eq!(v["bySource"]["Spor"], 1);
    assert_eq!(v["lastRun"]["fetched"], 2);
    assert!(v["lastCleanup"].is_null());
}

#[tokio::test]
async fn refresh_returns_summary_then_502_when_sources_down() {
    let (app, feeds) = test_app(None);
    let post = || {
        Request::builder()
            .method("POST")
            .uri("/api/refresh")
            .body(Body::empty())
            .expect("build POST /api/refresh")
    };

    let resp = app.clone().oneshot(post()).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v: Json = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(v["items"], 3);
    assert_eq!(v["merged"], 1);

    feeds.up.store(false, Ordering::SeqCst);
    let resp = app.oneshot(post()).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v: Json = serde_json::from_slice(&bytes).expect("json");
    assert!(v["error"].is_string());
}
