//! Log query HTTP handlers
//!
//! Query-string parameters use the wire names of the admin API (camelCase,
//! RFC 3339 timestamps, CSV enum lists). Invalid tokens fail the request
//! with a 400 naming the offending parameter.

use crate::error::AppError;
use crate::handlers::AppState;
use crate::logs::{LogEntry, LogFilter, QueryOrder, Severity, Source, DEFAULT_PAGE_LIMIT};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// Query parameters for the log query and stats endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogQueryParams {
    /// Range start, RFC 3339 (inclusive)
    pub start_time: Option<String>,
    /// Range end, RFC 3339 (inclusive)
    pub end_time: Option<String>,
    /// CSV of severities, e.g. `ERROR,CRITICAL`
    pub levels: Option<String>,
    /// CSV of sources, e.g. `WEB,API`
    pub sources: Option<String>,
    pub keyword: Option<String>,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
    pub request_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub status_code: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub offset: usize,
    pub order: QueryOrder,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

impl Default for LogQueryParams {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            levels: None,
            sources: None,
            keyword: None,
            user_id: None,
            correlation_id: None,
            request_id: None,
            resource_type: None,
            resource_id: None,
            status_code: None,
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
            order: QueryOrder::default(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
    pub total: u64,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct LogDetailResponse {
    pub log: LogEntry,
}

#[derive(Debug, Serialize)]
pub struct RelatedResponse {
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_count: u64,
    pub by_level: BTreeMap<String, u64>,
    pub by_source: BTreeMap<String, u64>,
    pub error_rate: f64,
    pub avg_response_time: f64,
}

/// GET /logs - filtered, paginated log query
pub async fn get_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<Json<LogsResponse>, AppError> {
    let filter = build_filter(&params)?;
    let page = state
        .store
        .query_page(&filter, params.limit, params.offset, params.order)
        .await?;

    Ok(Json(LogsResponse {
        logs: page.entries,
        total: page.total,
        has_more: page.has_more,
    }))
}

/// GET /logs/stats - aggregate statistics over the same filter dimensions
pub async fn get_stats(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<Json<StatsResponse>, AppError> {
    let filter = build_filter(&params)?;
    let stats = state.store.stats(&filter).await?;

    Ok(Json(StatsResponse {
        total_count: stats.total_count,
        by_level: stats.by_level,
        by_source: stats.by_source,
        error_rate: stats.error_rate,
        avg_response_time: stats.avg_duration_ms,
    }))
}

/// GET /logs/{id} - single entry by id
pub async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LogDetailResponse>, AppError> {
    let log = state
        .store
        .get_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("log entry {id}")))?;

    Ok(Json(LogDetailResponse { log }))
}

/// GET /logs/{id}/related - all entries sharing the entry's trace, oldest first
pub async fn get_related(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RelatedResponse>, AppError> {
    let log = state
        .store
        .get_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("log entry {id}")))?;

    let logs = match &log.correlation_id {
        Some(correlation_id) => state.store.get_related(correlation_id).await?,
        // an entry without a trace id has no related set
        None => Vec::new(),
    };

    Ok(Json(RelatedResponse { logs }))
}

pub(crate) fn build_filter(params: &LogQueryParams) -> Result<LogFilter, AppError> {
    let mut filter = LogFilter {
        keyword: params.keyword.clone(),
        user_id: params.user_id.clone(),
        correlation_id: params.correlation_id.clone(),
        request_id: params.request_id.clone(),
        resource_type: params.resource_type.clone(),
        resource_id: params.resource_id.clone(),
        status_code: params.status_code,
        ..Default::default()
    };

    if let Some(start) = &params.start_time {
        filter.start_time = Some(parse_time(start, "startTime")?);
    }
    if let Some(end) = &params.end_time {
        filter.end_time = Some(parse_time(end, "endTime")?);
    }
    if let Some(levels) = &params.levels {
        filter.levels = parse_csv::<Severity>(levels, "levels")?;
    }
    if let Some(sources) = &params.sources {
        filter.sources = parse_csv::<Source>(sources, "sources")?;
    }

    Ok(filter)
}

fn parse_time(value: &str, param: &'static str) -> Result<i64, AppError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|t| t.timestamp_millis())
        .map_err(|e| AppError::invalid_filter(param, format!("expected RFC 3339 timestamp: {e}")))
}

fn parse_csv<T>(value: &str, param: &'static str) -> Result<Vec<T>, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|e| AppError::invalid_filter(param, e.to_string()))
        })
        .collect()
}
