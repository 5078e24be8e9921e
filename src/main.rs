//! Haber Okuyoruz: binary entrypoint.
//! Loads configuration, wires the aggregator, spawns background jobs and
//! serves the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;

use haber_okuyoruz::analyze::ai_adapter::build_client_from_config;
use haber_okuyoruz::config::{AiConfig, AppConfig};
use haber_okuyoruz::ingest::discovery::{refresh_sources_with_ai, warmup_sources, DiscoveryOpts};
use haber_okuyoruz::ingest::fetcher::HttpFetcher;
use haber_okuyoruz::ingest::scheduler::{spawn_refresh_task, spawn_retention_task, RetentionCfg};
use haber_okuyoruz::ingest::sources::{
    load_sources_default, load_sources_from, resolve_sources, sources_path_default,
};
use haber_okuyoruz::metrics::Metrics;
use haber_okuyoruz::{router, Aggregator, AppState};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    haber_okuyoruz::init_tracing();

    let cfg = AppConfig::load().context("loading app config")?;
    let metrics = Metrics::init(cfg.cache.ttl_secs)?;

    let sources_path = cfg.sources.path.clone().unwrap_or_else(sources_path_default);
    warmup_sources(&sources_path, cfg.sources.include_defaults)?;
    let extra = match &cfg.sources.path {
        Some(p) => load_sources_from(p)?,
        None => load_sources_default()?,
    };
    let mut sources = resolve_sources(cfg.sources.include_defaults, extra);

    let ai_cfg = AiConfig::load_or_env(&cfg.ai_config_path);
    let ai = build_client_from_config(&ai_cfg);
    tracing::info!(provider = ai.provider_name(), enabled = ai.is_enabled(), "AI client ready");

    if cfg.sources.discover_on_start && ai.is_enabled() {
        let timeout = Duration::from_millis(cfg.sources.fetch_timeout_ms);
        let opts = DiscoveryOpts {
            max: cfg.sources.discover_max,
            timeout,
        };
        let fetcher = Arc::new(HttpFetcher::new(timeout)?);
        match refresh_sources_with_ai(
            ai.as_ref(),
            fetcher,
            &sources_path,
            cfg.sources.include_defaults,
            opts,
        )
        .await
        {
            Ok(report) => {
                tracing::info!(added = report.added.len(), "AI source discovery done");
                sources = report.sources;
            }
            Err(e) => tracing::warn!(error = ?e, "AI source discovery failed"),
        }
    }
    tracing::info!(count = sources.len(), "feed sources resolved");

    let aggregator = Arc::new(Aggregator::from_config(&cfg, sources, ai)?);

    spawn_retention_task(
        Arc::clone(&aggregator),
        RetentionCfg {
            every: Duration::from_secs(cfg.store.prune_every_secs),
            keep_days: cfg.store.retention_days,
        },
    );
    spawn_refresh_task(
        Arc::clone(&aggregator),
        Duration::from_secs(cfg.refresh.warm_every_secs),
    );

    let state = AppState::new(aggregator, cfg.query.clone());
    let app = router(state).merge(metrics.router());

    Ok(app.into())
}
