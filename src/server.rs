//! HTTP surface for the section caches

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cache::{PageRequest, SectionCacheStore, SectionResponse};
use crate::config::DEFAULT_PAGE_SIZE;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SectionCacheStore>,
    /// Bearer token for `/cache/*`; `None` disables those endpoints
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(cache: Arc<SectionCacheStore>, admin_token: Option<String>) -> Self {
        Self { cache, admin_token }
    }
}

/// Raw section query; values are parsed leniently
#[derive(Debug, Default, Deserialize)]
pub struct SectionQuery {
    page: Option<String>,
    #[serde(rename = "pageSize")]
    page_size: Option<String>,
    force: Option<String>,
}

impl SectionQuery {
    fn to_page_request(&self) -> PageRequest {
        let parse = |value: &Option<String>, default: usize| {
            value
                .as_deref()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        PageRequest {
            page: parse(&self.page, 1),
            page_size: parse(&self.page_size, DEFAULT_PAGE_SIZE),
            force: matches!(self.force.as_deref(), Some("1") | Some("true")),
        }
    }
}

/// Builds the router with all endpoints
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/cron", get(refresh_all))
        .route("/cache/export", post(export_cache))
        .route("/cache/import", post(import_cache))
        .route("/api/:section", get(get_section))
        .route("/:section", get(get_section))
        .with_state(state)
}

/// Binds `addr` and serves until the process exits
pub async fn start(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, router(state)).await
}

async fn get_section(
    State(state): State<AppState>,
    Path(section): Path<String>,
    Query(query): Query<SectionQuery>,
) -> Response {
    let request = query.to_page_request();
    match state.cache.serve(&section, request).await {
        Some(response) => Json(response).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(SectionResponse::unavailable(
                format!("Unknown section: {section}"),
                state.cache.clamp_page_size(request.page_size),
            )),
        )
            .into_response(),
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn refresh_all(State(state): State<AppState>) -> Json<Value> {
    let summaries = state.cache.refresh_all().await;
    info!(sections = summaries.len(), "Refreshed all sections");
    Json(json!({ "success": true, "sections": summaries }))
}

async fn export_cache(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    Json(state.cache.export()).into_response()
}

async fn import_cache(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    let report = state.cache.import(&payload);
    info!(imported = ?report.imported, skipped = ?report.skipped, "Cache import finished");
    Json(json!({
        "success": report.failed.is_empty(),
        "imported": report.imported,
        "skipped": report.skipped,
        "failed": report.failed,
    }))
    .into_response()
}

/// Checks the `Authorization: Bearer` header against the admin token
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.admin_token.as_deref() else {
        warn!("Admin endpoint called without a configured token");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "API key not configured" })),
        )
            .into_response());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    if presented == Some(expected) {
        Ok(())
    } else {
        warn!("Rejected admin request with a bad token");
        Err((StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response())
    }
}
