use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{CacheEntry, make_cache_key};
use crate::config::Settings;
use crate::error::AppError;
use crate::extract::ApiQuery;
use crate::markup::{Format, select_public};
use crate::metrics::{MARKUP_REQUESTS, RATE_LIMITED, RENDER_LATENCY};
use crate::models::MarkupRecord;
use crate::rate_limit::RatePreset;
use crate::state::AppState;

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkupQuery {
    pub project_id: Option<String>,
    pub path: Option<String>,
}

pub async fn schema_json_handler(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<MarkupQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    serve(&state, query, &headers, Format::Json).await
}

pub async fn schema_html_handler(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<MarkupQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    serve(&state, query, &headers, Format::Html).await
}

async fn serve(state: &AppState, query: MarkupQuery, headers: &HeaderMap, format: Format) -> Result<Response, AppError> {
    MARKUP_REQUESTS.with_label_values(&[format.as_str()]).inc();

    let project_id = parse_project_id(query.project_id.as_deref())?;
    let path = query.path.filter(|p| !p.trim().is_empty());
    let key = make_cache_key(format.as_str(), project_id, path.as_deref());

    let entry = match state.cache.get(&key) {
        Some(entry) => entry,
        None => {
            let timer = RENDER_LATENCY.start_timer();
            // unknown projects simply have no enabled records
            let records = state.store.list_enabled_records(project_id).await?;
            let selected = select_public(&records, path.as_deref());
            let body = format.render(&selected)?;
            timer.observe_duration();

            tracing::debug!(%project_id, format = format.as_str(), records = selected.len(), "rendered markup");
            if is_cacheable(&records, path.as_deref()) {
                state.cache.insert(key, body)
            } else {
                CacheEntry::new(body)
            }
        }
    };

    let cache_control = cache_control(&state.settings);
    let not_modified = headers
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|tag| tag == entry.etag);

    if not_modified {
        return Ok((
            StatusCode::NOT_MODIFIED,
            [(CACHE_CONTROL, cache_control), (ETAG, entry.etag)],
        )
            .into_response());
    }

    Ok((
        [
            (CONTENT_TYPE, format.content_type().to_string()),
            (CACHE_CONTROL, cache_control),
            (ETAG, entry.etag),
        ],
        entry.body,
    )
        .into_response())
}

// Only keys a project's own markup can produce are stored: the project must
// have enabled records and a path must be one some record is scoped to.
// Anything else is cheap to render and would let arbitrary query strings
// fill the cache.
fn is_cacheable(records: &[MarkupRecord], path: Option<&str>) -> bool {
    if records.is_empty() {
        return false;
    }
    match path {
        None => true,
        Some(path) => records.iter().any(|r| r.page_path.as_deref() == Some(path)),
    }
}

fn parse_project_id(raw: Option<&str>) -> Result<Uuid, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("projectId", "is required"))?;
    Uuid::parse_str(raw).map_err(|_| AppError::validation("projectId", "must be a valid project id"))
}

pub fn cache_control(settings: &Settings) -> String {
    let ttl = settings.cache_ttl.as_secs();
    format!(
        "public, max-age={ttl}, s-maxage={ttl}, stale-while-revalidate={}",
        settings.stale_ttl.as_secs()
    )
}

// First X-Forwarded-For hop set by the edge, else the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

// public presets, applied before the request reaches a markup handler
pub async fn public_rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let ip = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
    );
    // only well-formed ids get a project bucket
    let project = Query::<MarkupQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.project_id)
        .and_then(|id| Uuid::parse_str(id.trim()).ok())
        .map(|id| id.to_string());

    let mut checks = vec![
        (RatePreset::PublicPerMinute, ip.as_str()),
        (RatePreset::PublicPerHour, ip.as_str()),
    ];
    if let Some(project) = project.as_deref() {
        checks.push((RatePreset::ProjectPerDay, project));
    }

    let decision = state.limiter.check_presets(&checks, Utc::now());
    if !decision.allowed {
        RATE_LIMITED.inc();
        tracing::warn!(%ip, project = ?project, reset_at = %decision.reset_at, "rate limit exceeded");
        return AppError::RateLimited {
            reset_at: decision.reset_at,
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert(RATE_LIMIT_REMAINING, value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.reset_at.timestamp().to_string()) {
        headers.insert(RATE_LIMIT_RESET, value);
    }
    response
}
