//! Export HTTP handlers
//!
//! POST starts a job and returns its id immediately; the CSV is generated in
//! the background. Download returns 404 until the job has completed.

use crate::auth::AuthInfo;
use crate::error::AppError;
use crate::handlers::AppState;
use crate::logs::{ExportJob, ExportStatus, LogFilter, Severity, Source};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

/// Body of POST /logs/export.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportRequest {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub levels: Vec<Severity>,
    pub sources: Vec<Source>,
    pub keyword: Option<String>,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
    /// Record cap; values above the hard limit are clamped.
    pub max_records: Option<usize>,
}

impl ExportRequest {
    fn into_filter(self) -> Result<LogFilter, AppError> {
        let mut filter = LogFilter {
            levels: self.levels,
            sources: self.sources,
            keyword: self.keyword,
            user_id: self.user_id,
            correlation_id: self.correlation_id,
            ..Default::default()
        };
        if let Some(start) = &self.start_time {
            filter.start_time = Some(parse_time(start, "startTime")?);
        }
        if let Some(end) = &self.end_time {
            filter.end_time = Some(parse_time(end, "endTime")?);
        }
        Ok(filter)
    }
}

fn parse_time(value: &str, param: &'static str) -> Result<i64, AppError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|t| t.timestamp_millis())
        .map_err(|e| AppError::invalid_filter(param, format!("expected RFC 3339 timestamp: {e}")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExportResponse {
    pub job_id: String,
    pub status: ExportStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListExportsParams {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    50
}

/// Wire form of an export job. The download locator appears only once the
/// job has completed; pending and failed jobs never expose one.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStatusResponse {
    pub id: String,
    pub status: ExportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl From<ExportJob> for ExportStatusResponse {
    fn from(job: ExportJob) -> Self {
        let download_url = (job.status == ExportStatus::Completed)
            .then(|| format!("/logs/export/{}/download", job.id));

        Self {
            id: job.id,
            status: job.status,
            exported_count: job.exported_count,
            file_size: job.file_size,
            download_url,
            requested_by: job.requested_by,
            error: job.error,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListExportsResponse {
    pub jobs: Vec<ExportStatusResponse>,
}

/// POST /logs/export - start an asynchronous export
pub async fn start_export(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthInfo>,
    Json(req): Json<ExportRequest>,
) -> Result<(StatusCode, Json<StartExportResponse>), AppError> {
    let max_records = req.max_records;
    let filter = req.into_filter()?;

    let job_id = state
        .exports
        .start_export(filter, Some(auth.token_name), max_records)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartExportResponse {
            job_id,
            status: ExportStatus::Pending,
        }),
    ))
}

/// GET /logs/export - recent export jobs, newest first
pub async fn list_exports(
    State(state): State<AppState>,
    Query(params): Query<ListExportsParams>,
) -> Result<Json<ListExportsResponse>, AppError> {
    let jobs = state
        .store
        .list_export_jobs(params.limit)
        .await?
        .into_iter()
        .map(ExportStatusResponse::from)
        .collect();
    Ok(Json(ListExportsResponse { jobs }))
}

/// GET /logs/export/{id} - job status
pub async fn get_export(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExportStatusResponse>, AppError> {
    let job = state
        .exports
        .get_status(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("export job {id}")))?;

    Ok(Json(job.into()))
}

/// GET /logs/export/{id}/download - the CSV file of a completed job
pub async fn download_export(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<([(HeaderName, String); 2], Vec<u8>), AppError> {
    let job = state
        .exports
        .get_status(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("export job {id}")))?;

    if job.status != ExportStatus::Completed {
        return Err(AppError::NotFound(format!(
            "export job {id} has not completed"
        )));
    }

    let path = state.exports.output_path(&job.file_name);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| AppError::NotFound(format!("export file for job {id}")))?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", job.file_name),
        ),
    ];

    Ok((headers, bytes))
}
