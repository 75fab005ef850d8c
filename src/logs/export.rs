//! Asynchronous CSV export
//!
//! Exports run in background tasks tracked through `export_jobs` rows. A job
//! moves forward only: pending to completed or pending to failed, never back.
//! The record cap is a hard ceiling; requests above it are clamped silently.

use super::entry::LogEntry;
use super::query::LogFilter;
use super::store::LogStore;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Upper bound on records in a single export.
pub const EXPORT_HARD_CAP: usize = 10_000;

/// Lifecycle state of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Pending,
    Completed,
    Failed,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for ExportStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(anyhow!("unknown export status: {other}")),
        }
    }
}

/// One export job as tracked in the store. Not a wire type; the handlers
/// project it into a status response that only reveals the download
/// location once the job has completed.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub id: String,
    pub filters: LogFilter,
    pub status: ExportStatus,
    pub exported_count: Option<i64>,
    pub file_size: Option<i64>,
    pub file_name: String,
    pub requested_by: Option<String>,
    pub error: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl LogStore {
    pub async fn insert_export_job(
        &self,
        id: &str,
        filter: &LogFilter,
        file_name: &str,
        requested_by: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO export_jobs (id, filters, status, file_name, requested_by, created_at)
             VALUES (?, ?, 'pending', ?, ?, ?)",
        )
        .bind(id)
        .bind(serde_json::to_string(filter)?)
        .bind(file_name)
        .bind(requested_by)
        .bind(super::entry::current_millis())
        .execute(self.pool())
        .await
        .context("Failed to insert export job")?;
        Ok(())
    }

    pub async fn get_export_job(&self, id: &str) -> Result<Option<ExportJob>> {
        let row = sqlx::query("SELECT * FROM export_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    /// Recent jobs, newest first.
    pub async fn list_export_jobs(&self, limit: usize) -> Result<Vec<ExportJob>> {
        let rows = sqlx::query("SELECT * FROM export_jobs ORDER BY created_at DESC, id ASC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Transition a pending job to completed. Terminal jobs are left alone.
    pub async fn mark_export_completed(&self, id: &str, count: i64, file_size: i64) -> Result<()> {
        sqlx::query(
            "UPDATE export_jobs SET status = 'completed', exported_count = ?, file_size = ?,
                                    completed_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(count)
        .bind(file_size)
        .bind(super::entry::current_millis())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Transition a pending job to failed. Terminal jobs are left alone.
    pub async fn mark_export_failed(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE export_jobs SET status = 'failed', error = ?, completed_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(error)
        .bind(super::entry::current_millis())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

fn job_from_row(row: &SqliteRow) -> Result<ExportJob> {
    let status: String = row.get("status");
    let filters: String = row.get("filters");
    Ok(ExportJob {
        id: row.get("id"),
        filters: serde_json::from_str(&filters)?,
        status: status.parse()?,
        exported_count: row.get("exported_count"),
        file_size: row.get("file_size"),
        file_name: row.get("file_name"),
        requested_by: row.get("requested_by"),
        error: row.get("error"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    })
}

/// Runs exports and tracks their jobs.
#[derive(Clone)]
pub struct ExportRunner {
    store: Arc<LogStore>,
    export_dir: PathBuf,
}

impl ExportRunner {
    pub fn new(store: Arc<LogStore>, export_dir: PathBuf) -> Self {
        Self { store, export_dir }
    }

    /// Record a pending job and kick off the export in the background.
    /// Returns the job id immediately.
    pub async fn start_export(
        &self,
        filter: LogFilter,
        requested_by: Option<String>,
        max_records: Option<usize>,
    ) -> Result<String> {
        let max_records = clamp_max_records(max_records);
        let id = Uuid::new_v4().to_string();
        let file_name = format!("logs-export-{id}.csv");

        self.store
            .insert_export_job(&id, &filter, &file_name, requested_by.as_deref())
            .await?;

        let runner = self.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            runner.run_job(&job_id, filter, &file_name, max_records).await;
        });

        Ok(id)
    }

    pub async fn get_status(&self, id: &str) -> Result<Option<ExportJob>> {
        self.store.get_export_job(id).await
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.export_dir.join(file_name)
    }

    async fn run_job(&self, id: &str, filter: LogFilter, file_name: &str, max_records: usize) {
        match self.write_export(&filter, file_name, max_records).await {
            Ok((count, file_size)) => {
                if let Err(err) = self.store.mark_export_completed(id, count, file_size).await {
                    tracing::error!(error = ?err, job_id = id, "Failed to record export completion");
                } else {
                    tracing::info!(job_id = id, count, file_size, "Export completed");
                }
            }
            Err(err) => {
                tracing::warn!(error = ?err, job_id = id, "Export failed");
                let message = format!("{err:#}");
                if let Err(err) = self.store.mark_export_failed(id, &message).await {
                    tracing::error!(error = ?err, job_id = id, "Failed to record export failure");
                }
            }
        }
    }

    async fn write_export(
        &self,
        filter: &LogFilter,
        file_name: &str,
        max_records: usize,
    ) -> Result<(i64, i64)> {
        let entries = self.store.fetch_matching(filter, max_records).await?;

        let mut csv = String::from(CSV_HEADER);
        for entry in &entries {
            csv.push_str(&csv_row(entry));
        }

        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .context("Failed to create export directory")?;
        tokio::fs::write(self.output_path(file_name), &csv)
            .await
            .context("Failed to write export file")?;

        Ok((entries.len() as i64, csv.len() as i64))
    }
}

const CSV_HEADER: &str =
    "timestamp,level,source,message,userId,correlationId,method,path,statusCode,durationMs\n";

fn csv_row(entry: &LogEntry) -> String {
    let timestamp = DateTime::<Utc>::from_timestamp_millis(entry.timestamp)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    let opt = |v: &Option<String>| csv_field(v.as_deref().unwrap_or(""));
    let num = |v: &Option<i64>| v.map(|n| n.to_string()).unwrap_or_default();

    format!(
        "{},{},{},{},{},{},{},{},{},{}\n",
        timestamp,
        entry.level.as_str(),
        entry.source.as_str(),
        csv_field(&entry.message),
        opt(&entry.user_id),
        opt(&entry.correlation_id),
        opt(&entry.method),
        opt(&entry.path),
        num(&entry.status_code),
        num(&entry.duration_ms),
    )
}

/// Quote a field when it contains a delimiter, quote, or newline; double any
/// embedded quotes.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn clamp_max_records(requested: Option<usize>) -> usize {
    requested.unwrap_or(EXPORT_HARD_CAP).min(EXPORT_HARD_CAP)
}
