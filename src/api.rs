// src/api.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::aggregator::{Aggregator, IngestSummary};
use crate::config::app::QueryCfg;
use crate::model::Category;
use crate::query::{NewsPage, NewsQuery};

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub query_cfg: QueryCfg,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>, query_cfg: QueryCfg) -> Self {
        Self {
            aggregator,
            query_cfg,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/ping", get(ping))
        .route("/api/news", get(news))
        .route("/api/stats", get(stats))
        .route("/api/refresh", post(refresh))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "message": "Sunucu aktif",
    }))
}

async fn news(State(state): State<AppState>, Query(q): Query<NewsQuery>) -> Response {
    let snapshot = state.aggregator.get_items().await;
    let (total, items) = q.apply(&snapshot.items, Utc::now(), &state.query_cfg);
    let page = NewsPage {
        updated_at: snapshot.updated_at,
        total,
        categories: Category::ALL.to_vec(),
        sources: state.aggregator.source_names(),
        items,
    };
    ([(header::CACHE_CONTROL, "no-store")], Json(page)).into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResp {
    total: usize,
    by_category: BTreeMap<String, usize>,
    by_source: BTreeMap<String, usize>,
    last_cleanup: Option<DateTime<Utc>>,
    last_run: Option<IngestSummary>,
}

/// Store counts when persisted, otherwise counts over the cached snapshot.
async fn stats(State(state): State<AppState>) -> Json<StatsResp> {
    let agg = &state.aggregator;
    let (total, by_category, by_source, last_cleanup) = match agg.store() {
        Some(store) => (
            store.total().await,
            store.count_by_category().await,
            store.count_by_source().await,
            store.last_cleanup().await,
        ),
        None => {
            let items = agg
                .cache()
                .last()
                .map(|s| s.items.as_ref().clone())
                .unwrap_or_default();
            let mut by_cat = BTreeMap::new();
            let mut by_src = BTreeMap::new();
            for it in &items {
                *by_cat.entry(it.category).or_insert(0) += 1;
                *by_src.entry(it.source.clone()).or_insert(0) += 1;
            }
            (items.len(), by_cat, by_src, None)
        }
    };

    Json(StatsResp {
        total,
        by_category: by_category
            .into_iter()
            .map(|(c, n)| (c.as_str().to_string(), n))
            .collect(),
        by_source,
        last_cleanup,
        last_run: agg.last_summary(),
    })
}

async fn refresh(State(state): State<AppState>) -> Response {
    match state.aggregator.refresh().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            tracing::warn!(target: "api", error = %e, "manual refresh failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
