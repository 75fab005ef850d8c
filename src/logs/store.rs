//! SQLite persistence for log entries
//!
//! Async sqlx layer with connection pooling, WAL journal mode for concurrent
//! reads/writes, and embedded migrations. Every write is a single independent
//! row insert; the store never mutates an entry after it lands.

use super::entry::{LogEntry, Severity, Source};
use super::query::{LogFilter, LogStats, QueryOrder, QueryPage};
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// Log store handle.
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    /// Open (or create) the database at `database_url` and run migrations.
    ///
    /// `sqlite::memory:` URLs are pinned to a single pooled connection so
    /// every caller sees the same database; SQLite gives each in-memory
    /// connection its own private store otherwise.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .pragma("synchronous", "NORMAL")
            .pragma("temp_store", "memory");

        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .context("Failed to connect to log database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run log database migrations")?;

        Ok(Self { pool })
    }

    /// Insert a single entry. Each insert is independent; there are no
    /// multi-entry transactions on the write path.
    pub async fn insert(&self, entry: &LogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO logs (id, timestamp, level, source, message, detail, correlation_id,
                               request_id, user_id, session_id, resource_type, resource_id,
                               error_code, stack_trace, method, path, status_code, duration_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(entry.timestamp)
        .bind(entry.level.as_str())
        .bind(entry.source.as_str())
        .bind(&entry.message)
        .bind(entry.detail.as_ref().map(|d| d.to_string()))
        .bind(&entry.correlation_id)
        .bind(&entry.request_id)
        .bind(&entry.user_id)
        .bind(&entry.session_id)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.error_code)
        .bind(&entry.stack_trace)
        .bind(&entry.method)
        .bind(&entry.path)
        .bind(entry.status_code)
        .bind(entry.duration_ms)
        .execute(&self.pool)
        .await
        .context("Failed to insert log entry")?;

        Ok(())
    }

    /// Fetch a single entry by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<LogEntry>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM logs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| entry_from_row(&r)).transpose()
    }

    /// All entries sharing a correlation id, oldest first, so a request's
    /// life can be replayed chronologically. Ties on timestamp break by id.
    pub async fn get_related(&self, correlation_id: &str) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM logs WHERE correlation_id = ? ORDER BY timestamp ASC, id ASC"
        ))
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// One bounded, ordered page of matching entries plus the total match
    /// count. `has_more` holds exactly when `offset + returned < total`.
    pub async fn query_page(
        &self,
        filter: &LogFilter,
        limit: usize,
        offset: usize,
        order: QueryOrder,
    ) -> Result<QueryPage> {
        let total = self.count_matching(filter).await?;

        let mut qb = QueryBuilder::new(format!("SELECT {COLUMNS} FROM logs WHERE 1=1"));
        push_filter(&mut qb, filter);
        match order {
            QueryOrder::Desc => qb.push(" ORDER BY timestamp DESC, id ASC"),
            QueryOrder::Asc => qb.push(" ORDER BY timestamp ASC, id ASC"),
        };
        qb.push(" LIMIT ").push_bind(limit as i64);
        qb.push(" OFFSET ").push_bind(offset as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let entries: Vec<LogEntry> = rows.iter().map(entry_from_row).collect::<Result<_>>()?;

        let has_more = (offset as u64 + entries.len() as u64) < total;

        Ok(QueryPage {
            entries,
            total,
            has_more,
        })
    }

    /// Matching entries without the page-size cap, newest first. The export
    /// runner bounds this with its own record cap instead.
    pub async fn fetch_matching(&self, filter: &LogFilter, max_records: usize) -> Result<Vec<LogEntry>> {
        let mut qb = QueryBuilder::new(format!("SELECT {COLUMNS} FROM logs WHERE 1=1"));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY timestamp DESC, id ASC LIMIT ").push_bind(max_records as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Count of all entries matching the filter.
    pub async fn count_matching(&self, filter: &LogFilter) -> Result<u64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM logs WHERE 1=1");
        push_filter(&mut qb, filter);

        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    /// Aggregate statistics over the same filter the query path uses.
    pub async fn stats(&self, filter: &LogFilter) -> Result<LogStats> {
        let by_level = self.group_count(filter, "level").await?;
        let by_source = self.group_count(filter, "source").await?;

        let total_count: u64 = by_level.values().sum();

        let error_count = by_level.get(Severity::Error.as_str()).copied().unwrap_or(0)
            + by_level.get(Severity::Critical.as_str()).copied().unwrap_or(0);

        let error_rate = if total_count == 0 {
            0.0
        } else {
            error_count as f64 / total_count as f64 * 100.0
        };

        // AVG ignores NULLs, so entries without HTTP fields never dilute the
        // mean; an empty set yields NULL which maps to 0.
        let mut qb = QueryBuilder::new("SELECT AVG(duration_ms) FROM logs WHERE 1=1");
        push_filter(&mut qb, filter);
        let avg: Option<f64> = qb.build_query_scalar().fetch_one(&self.pool).await?;

        Ok(LogStats {
            total_count,
            by_level,
            by_source,
            error_rate,
            avg_duration_ms: avg.unwrap_or(0.0),
        })
    }

    async fn group_count(&self, filter: &LogFilter, column: &str) -> Result<BTreeMap<String, u64>> {
        // `column` is one of two fixed identifiers, never caller input.
        let mut qb = QueryBuilder::new(format!(
            "SELECT {column}, COUNT(*) AS n FROM logs WHERE 1=1"
        ));
        push_filter(&mut qb, filter);
        qb.push(format!(" GROUP BY {column}"));

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let key: String = row.get(0);
            let n: i64 = row.get("n");
            counts.insert(key, n as u64);
        }
        Ok(counts)
    }

    /// Delete entries of one severity strictly older than `cutoff`.
    /// Returns the number of rows removed.
    pub async fn delete_older_than(&self, level: Severity, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM logs WHERE level = ? AND timestamp < ?")
            .bind(level.as_str())
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to delete expired log entries")?;

        Ok(result.rows_affected())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const COLUMNS: &str = "id, timestamp, level, source, message, detail, correlation_id, request_id, \
                       user_id, session_id, resource_type, resource_id, error_code, stack_trace, \
                       method, path, status_code, duration_ms";

/// Append the WHERE fragment for a filter. Dimensions AND together; the
/// keyword matches message, correlation id, or error code (OR across the
/// three, case-insensitive via SQLite's LIKE).
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &LogFilter) {
    if let Some(start) = filter.start_time {
        qb.push(" AND timestamp >= ").push_bind(start);
    }
    if let Some(end) = filter.end_time {
        qb.push(" AND timestamp <= ").push_bind(end);
    }
    if !filter.levels.is_empty() {
        qb.push(" AND level IN (");
        let mut sep = qb.separated(", ");
        for level in &filter.levels {
            sep.push_bind(level.as_str());
        }
        qb.push(")");
    }
    if !filter.sources.is_empty() {
        qb.push(" AND source IN (");
        let mut sep = qb.separated(", ");
        for source in &filter.sources {
            sep.push_bind(source.as_str());
        }
        qb.push(")");
    }
    if let Some(keyword) = &filter.keyword {
        let pattern = format!("%{}%", escape_like(keyword));
        qb.push(" AND (message LIKE ").push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR correlation_id LIKE ").push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR error_code LIKE ").push_bind(pattern);
        qb.push(" ESCAPE '\\')");
    }
    if let Some(user_id) = &filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if let Some(correlation_id) = &filter.correlation_id {
        qb.push(" AND correlation_id = ").push_bind(correlation_id.clone());
    }
    if let Some(request_id) = &filter.request_id {
        qb.push(" AND request_id = ").push_bind(request_id.clone());
    }
    if let Some(resource_type) = &filter.resource_type {
        qb.push(" AND resource_type = ").push_bind(resource_type.clone());
    }
    if let Some(resource_id) = &filter.resource_id {
        qb.push(" AND resource_id = ").push_bind(resource_id.clone());
    }
    if let Some(status_code) = filter.status_code {
        qb.push(" AND status_code = ").push_bind(status_code);
    }
}

/// Escape LIKE wildcards in user-supplied keywords.
fn escape_like(keyword: &str) -> String {
    keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn entry_from_row(row: &SqliteRow) -> Result<LogEntry> {
    let level: String = row.get("level");
    let source: String = row.get("source");
    let detail: Option<String> = row.get("detail");

    Ok(LogEntry {
        id: row.get("id"),
        timestamp: row.get("timestamp"),
        level: level.parse::<Severity>()?,
        source: source.parse::<Source>()?,
        message: row.get("message"),
        detail: detail.and_then(|d| serde_json::from_str(&d).ok()),
        correlation_id: row.get("correlation_id"),
        request_id: row.get("request_id"),
        user_id: row.get("user_id"),
        session_id: row.get("session_id"),
        resource_type: row.get("resource_type"),
        resource_id: row.get("resource_id"),
        error_code: row.get("error_code"),
        stack_trace: row.get("stack_trace"),
        method: row.get("method"),
        path: row.get("path"),
        status_code: row.get("status_code"),
        duration_ms: row.get("duration_ms"),
    })
}
