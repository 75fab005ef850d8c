//! Structured log writer
//!
//! The single entry point through which application code records log
//! entries. Each write persists to the store first, then publishes to the
//! broadcast hub, so no live subscriber ever sees an entry that was not
//! durably recorded. Writes are fire-and-forget: a persistence failure is
//! reported through `tracing` and swallowed, and the entry is not published.

use super::broadcast::LogBroadcaster;
use super::entry::{current_millis, LogEntry, Severity, Source};
use super::store::LogStore;
use crate::context::RequestContext;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Fields of an HTTP request completion entry.
#[derive(Debug, Clone)]
pub struct HttpRequestLog {
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub duration_ms: u64,
    pub detail: Option<Value>,
}

/// Writer bound to one source. Cheap to clone; each subsystem holds its own.
#[derive(Clone)]
pub struct LogWriter {
    source: Source,
    store: Arc<LogStore>,
    hub: Arc<LogBroadcaster>,
}

impl LogWriter {
    pub fn new(source: Source, store: Arc<LogStore>, hub: Arc<LogBroadcaster>) -> Self {
        Self { source, store, hub }
    }

    /// Same store and hub, different source tag.
    pub fn for_source(&self, source: Source) -> Self {
        Self {
            source,
            store: Arc::clone(&self.store),
            hub: Arc::clone(&self.hub),
        }
    }

    pub async fn debug(&self, message: impl Into<String>, detail: Option<Value>) {
        self.write(self.draft(Severity::Debug, message.into(), detail)).await;
    }

    pub async fn info(&self, message: impl Into<String>, detail: Option<Value>) {
        self.write(self.draft(Severity::Info, message.into(), detail)).await;
    }

    pub async fn warn(&self, message: impl Into<String>, detail: Option<Value>) {
        self.write(self.draft(Severity::Warn, message.into(), detail)).await;
    }

    pub async fn error(&self, message: impl Into<String>, detail: Option<Value>) {
        self.write(self.draft(Severity::Error, message.into(), detail)).await;
    }

    pub async fn critical(&self, message: impl Into<String>, detail: Option<Value>) {
        self.write(self.draft(Severity::Critical, message.into(), detail)).await;
    }

    /// Error entry carrying the cause: the error's display form becomes the
    /// error code, its debug form (the full chain) the stack trace.
    pub async fn error_with(
        &self,
        message: impl Into<String>,
        err: &anyhow::Error,
        detail: Option<Value>,
    ) {
        let mut entry = self.draft(Severity::Error, message.into(), detail);
        attach_error(&mut entry, err);
        self.write(entry).await;
    }

    pub async fn critical_with(
        &self,
        message: impl Into<String>,
        err: &anyhow::Error,
        detail: Option<Value>,
    ) {
        let mut entry = self.draft(Severity::Critical, message.into(), detail);
        attach_error(&mut entry, err);
        self.write(entry).await;
    }

    /// Entry tied to a domain object, queryable by resource type and id.
    pub async fn resource_event(
        &self,
        level: Severity,
        message: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        detail: Option<Value>,
    ) {
        let mut entry = self.draft(level, message.into(), detail);
        entry.resource_type = Some(resource_type.into());
        entry.resource_id = Some(resource_id.into());
        self.write(entry).await;
    }

    /// HTTP completion entry. Severity follows the status code.
    pub async fn http_request(&self, req: HttpRequestLog) {
        let message = format!(
            "{} {} -> {} ({}ms)",
            req.method, req.path, req.status_code, req.duration_ms
        );
        let mut entry = self.draft(Severity::for_status(req.status_code), message, req.detail);
        entry.method = Some(req.method);
        entry.path = Some(req.path);
        entry.status_code = Some(req.status_code as i64);
        entry.duration_ms = Some(req.duration_ms as i64);
        self.write(entry).await;
    }

    /// New entry with generated id, current timestamp, and whatever request
    /// context is ambient on this task.
    fn draft(&self, level: Severity, message: String, detail: Option<Value>) -> LogEntry {
        let ctx = RequestContext::current();
        LogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: current_millis(),
            level,
            source: self.source,
            message,
            detail,
            correlation_id: ctx.as_ref().map(|c| c.correlation_id.clone()),
            request_id: ctx.as_ref().map(|c| c.request_id.clone()),
            user_id: ctx.as_ref().and_then(|c| c.user_id.clone()),
            session_id: ctx.as_ref().and_then(|c| c.session_id.clone()),
            resource_type: None,
            resource_id: None,
            error_code: None,
            stack_trace: None,
            method: None,
            path: None,
            status_code: None,
            duration_ms: None,
        }
    }

    async fn write(&self, entry: LogEntry) {
        if let Err(err) = self.store.insert(&entry).await {
            tracing::error!(
                error = ?err,
                level = %entry.level,
                message = %entry.message,
                "Dropped log entry: persistence failed"
            );
            return;
        }
        self.hub.publish(&entry);
    }
}

fn attach_error(entry: &mut LogEntry, err: &anyhow::Error) {
    entry.error_code = Some(err.to_string());
    entry.stack_trace = Some(format!("{err:?}"));
}
