//! HTTP API surface.
//!
//! Operational endpoints only: manual scrape trigger, source analysis,
//! health, and metrics exposition. Brand/topic/keyword CRUD and the
//! mention read API live elsewhere.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::coordinator::{Coordinator, CoordinatorError, Trigger};
use mediascout_db::NewSourceConfig;
use mediascout_scraper::analyzer::analyze_source;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub coordinator: Arc<Coordinator>,
    pub metrics: PrometheusHandle,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .route("/scrape/brand/{brand_id}", post(scrape_brand))
        .route("/sources/analyze", post(analyze))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match mediascout_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "database": "ok" })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "degraded", "database": "unavailable" })),
            )
        }
    }
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Serialize)]
struct ScrapeStarted {
    run_id: String,
    brand_id: i64,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ScrapeLocked {
    error: &'static str,
    brand_id: i64,
    started_at: Option<DateTime<Utc>>,
}

/// `POST /scrape/brand/{brand_id}` — start a scrape run.
///
/// Acquires the brand lock synchronously so lock conflicts surface as
/// 409 immediately, then runs the scrape in the background and returns
/// 202 with the run id.
async fn scrape_brand(
    State(state): State<AppState>,
    Path(brand_id): Path<i64>,
) -> axum::response::Response {
    match state.coordinator.begin_run(brand_id, Trigger::Api).await {
        Ok(start) => {
            let response = ScrapeStarted {
                run_id: start.run_id.clone(),
                brand_id,
                status: "started",
            };
            let coordinator = Arc::clone(&state.coordinator);
            tokio::spawn(async move {
                coordinator.complete_run(start).await;
            });
            (StatusCode::ACCEPTED, Json(response)).into_response()
        }
        Err(CoordinatorError::BrandNotFound(_)) => {
            ApiError::new("not_found", format!("brand {brand_id} not found")).into_response()
        }
        Err(CoordinatorError::Locked { started_at, .. }) => (
            StatusCode::CONFLICT,
            Json(ScrapeLocked {
                error: "scrape_in_progress",
                brand_id,
                started_at,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(brand_id, error = %e, "failed to start scrape run");
            ApiError::new("internal_error", "failed to start scrape run").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    url: String,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    domain: String,
    title_selector: Option<String>,
    content_selector: Option<String>,
    date_selector: Option<String>,
    search_url_pattern: Option<String>,
    confidence: &'static str,
    message: String,
}

/// `POST /sources/analyze` — derive and persist a recipe for a domain
/// from a sample article URL.
async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> axum::response::Response {
    let url = request.url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return ApiError::new("bad_request", "url must start with http:// or https://")
            .into_response();
    }

    let suggestion = match analyze_source(&state.coordinator.http(), url).await {
        Ok(suggestion) => suggestion,
        Err(e) => {
            tracing::warn!(url, error = %e, "source analysis failed");
            return ApiError::new("internal_error", format!("analysis failed: {e}"))
                .into_response();
        }
    };

    let config = NewSourceConfig {
        domain: suggestion.domain.clone(),
        title_selector: suggestion.title_selector.clone(),
        content_selector: suggestion.content_selector.clone(),
        date_selector: suggestion.date_selector.clone(),
        search_url_pattern: suggestion.search_url_pattern.clone(),
        rss_urls: None,
        sitemap_url: None,
        discovery_type: suggestion
            .search_url_pattern
            .is_some()
            .then(|| "site_search".to_string()),
    };

    let message = match mediascout_db::upsert_source_config(&state.pool, &config).await {
        Ok(_) => format!("configuration saved for {}", suggestion.domain),
        Err(e) => {
            tracing::error!(domain = %suggestion.domain, error = %e, "recipe upsert failed");
            format!("analysis succeeded but saving failed for {}", suggestion.domain)
        }
    };

    Json(AnalyzeResponse {
        domain: suggestion.domain,
        title_selector: suggestion.title_selector,
        content_selector: suggestion.content_selector,
        date_selector: suggestion.date_selector,
        search_url_pattern: suggestion.search_url_pattern,
        confidence: suggestion.confidence.as_str(),
        message,
    })
    .into_response()
}
