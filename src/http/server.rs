// src/http/server.rs
//
// Router assembly and request handlers for the streaming HTTP surface
// (spec §4.11). CORS is permitted from any origin; a top-level
// catch-panic layer converts any handler panic into a 500 rather than
// an abrupt connection reset, mirroring the plugin manager's panic
// isolation discipline at the HTTP boundary.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::FutureExt;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::data::{JobStatus, WebhookJob};
use crate::error::CadenceError;
use crate::http::{sse, AppState};
use crate::queue::JobProcessor;
use crate::runner::streaming::SourceSetup;
use crate::runner::StreamingRunner;
use crate::source::repository::clone_remote;
use crate::source::WebSource;
use crate::strategy::detector::{Detector, RepositoryDetector, WebDetector};
use crate::strategy::{repository_strategies, web_strategies};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/github", post(super::webhook::github_webhook))
        .route("/webhooks/gitlab", post(super::webhook::gitlab_webhook))
        .route("/api/stream/repository", post(stream_repository))
        .route("/api/stream/website", post(stream_website))
        .route("/jobs/:id", get(get_job))
        .route("/jobs", get(list_jobs))
        .route("/api/results/:id", get(get_result))
        .route("/metrics", get(metrics_text))
        .route("/api/metrics", get(metrics_json))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/cache/clear", post(cache_clear))
        .route("/api/plugins", get(list_plugins))
        .route("/health", get(health))
        .layer(middleware::from_fn(catch_panic))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct StreamRepositoryRequest {
    pub repository_url: String,
    pub branch: Option<String>,
}

async fn stream_repository(
    State(state): State<AppState>,
    Json(req): Json<StreamRepositoryRequest>,
) -> impl IntoResponse {
    let disabled = state.config.disabled_strategies();
    let exclude = state.config.exclude_files.clone();
    let runner = Arc::new(
        StreamingRunner::with_disabled(disabled)
            .with_cache(state.cache.clone())
            .with_metrics(state.metrics.clone()),
    );

    let mut detectors: Vec<Box<dyn Detector>> =
        vec![Box::new(RepositoryDetector::new(repository_strategies::default_strategies()))];
    detectors.push(Box::new(state.plugins.detector()));

    let setup = SourceSetup::CloneRepository {
        url: req.repository_url.clone(),
        branch: req.branch.clone(),
        exclude,
    };

    let (rx, _cancel) = runner.run(setup, detectors);
    sse::stream_events(rx).into_response()
}

#[derive(Debug, Deserialize)]
pub struct StreamWebsiteRequest {
    pub url: String,
}

async fn stream_website(State(state): State<AppState>, Json(req): Json<StreamWebsiteRequest>) -> impl IntoResponse {
    let disabled = state.config.disabled_strategies();
    let runner = Arc::new(
        StreamingRunner::with_disabled(disabled)
            .with_cache(state.cache.clone())
            .with_metrics(state.metrics.clone()),
    );
    let source: Arc<dyn crate::source::Source> = Arc::new(WebSource::new(req.url));
    let mut detectors: Vec<Box<dyn Detector>> =
        vec![Box::new(WebDetector::new(web_strategies::default_strategies()))];
    detectors.push(Box::new(state.plugins.detector()));
    let (rx, _cancel) = runner.run(source, detectors);
    sse::stream_events(rx)
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default)]
    limit: usize,
}

async fn get_job(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> impl IntoResponse {
    match state.queue.get(&id) {
        Some(job) => (StatusCode::OK, Json(json!(job))).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "job not found"}))).into_response(),
    }
}

async fn list_jobs(State(state): State<AppState>, Query(q): Query<ListJobsQuery>) -> impl IntoResponse {
    Json(json!(state.queue.list_jobs(q.limit)))
}

async fn get_result(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> impl IntoResponse {
    match state.queue.get(&id) {
        Some(job) if job.status == JobStatus::Completed => match job.result {
            Some(report) => (StatusCode::OK, Json(json!(report))).into_response(),
            None => (StatusCode::NOT_FOUND, Json(json!({"error": "report missing"}))).into_response(),
        },
        Some(job) => (
            StatusCode::ACCEPTED,
            Json(json!({"status": job.status, "progress": job.progress})),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "job not found"}))).into_response(),
    }
}

async fn metrics_text(State(state): State<AppState>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.prometheus_text(),
    )
}

async fn metrics_json(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(state.metrics.snapshot()))
}

async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.cache.stats();
    Json(json!({
        "hits": stats.hits,
        "misses": stats.misses,
        "evictions": stats.evictions,
        "size": stats.size,
        "max_size": stats.max_size,
        "hit_rate": stats.hit_rate,
    }))
}

async fn cache_clear(State(state): State<AppState>) -> impl IntoResponse {
    state.cache.clear();
    Json(json!({"cleared": true}))
}

async fn list_plugins(State(state): State<AppState>) -> impl IntoResponse {
    let registry = crate::strategy::registry::StrategyRegistry::new();
    state.plugins.merge_into_registry(&registry);
    Json(json!(registry.all()))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Top-level recovery middleware: converts any panic inside a handler into
/// a 500 response instead of tearing down the connection task.
async fn catch_panic(request: Request, next: Next) -> axum::response::Response {
    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(_) => {
            error!("request handler panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal server error"}))).into_response()
        }
    }
}

/// Bridges a push-event WebhookJob into a full repository analysis: clone,
/// run the synchronous runner, score. Used by the job queue workers.
pub struct WebhookAnalysisProcessor {
    pub disabled: std::collections::HashSet<String>,
    pub exclude_files: Vec<String>,
    pub plugins: Arc<crate::plugin::PluginManager>,
    pub cache: Arc<dyn crate::cache::Cache>,
    pub metrics: Arc<dyn crate::metrics::Metrics>,
}

#[async_trait::async_trait]
impl JobProcessor for WebhookAnalysisProcessor {
    async fn process(&self, job: &WebhookJob) -> Result<crate::data::AnalysisReport, CadenceError> {
        let source = clone_remote(&job.repo_url, Some(&job.branch), self.exclude_files.clone()).await?;
        let mut detectors: Vec<Box<dyn Detector>> =
            vec![Box::new(RepositoryDetector::new(repository_strategies::default_strategies()))];
        detectors.push(Box::new(self.plugins.detector()));

        let runner = crate::runner::SyncRunner::with_disabled(self.disabled.clone())
            .with_cache(self.cache.clone())
            .with_metrics(self.metrics.clone());
        runner.run(&source, &detectors).await
    }
}
