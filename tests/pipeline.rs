//! End-to-end scenarios through the library API: writes made inside a
//! request context flowing through querying, related-trace lookup, stats,
//! streaming, export, and retention.

use axum::extract::{Path, Query, State};
use axum::Extension;
use loghub::auth::AuthInfo;
use loghub::config::{
    AdminTokenConfig, Config, DatabaseConfig, ExportConfig, RetentionConfig, ServerConfig,
};
use loghub::context::RequestContext;
use loghub::handlers::{export_api, logs_api, AppState};
use loghub::logs::{
    run_sweep_now, ExportRunner, ExportStatus, LogBroadcaster, LogStore, LogWriter, QueryOrder,
    Severity, Source, StreamFilter, EXPORT_HARD_CAP,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    state: AppState,
    writer: LogWriter,
    _export_dir: TempDir,
}

async fn fixture() -> Fixture {
    let config = Arc::new(Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
        },
        export: ExportConfig {
            directory: "exports".to_string(),
        },
        retention: RetentionConfig { sweep_hour: 3 },
        admin_tokens: vec![AdminTokenConfig {
            token: "tok-test".to_string(),
            name: "ops".to_string(),
            enabled: true,
            admin: true,
        }],
    });

    let store = Arc::new(LogStore::new("sqlite::memory:").await.unwrap());
    let hub = Arc::new(LogBroadcaster::new());
    let writer = LogWriter::new(Source::Web, Arc::clone(&store), Arc::clone(&hub));
    let export_dir = TempDir::new().unwrap();
    let exports = ExportRunner::new(Arc::clone(&store), export_dir.path().to_path_buf());

    let state = AppState {
        config,
        store: Arc::clone(&store),
        hub,
        request_writer: writer.for_source(Source::Api),
        exports,
    };

    Fixture {
        state,
        writer,
        _export_dir: export_dir,
    }
}

#[tokio::test]
async fn write_query_related_and_stats_round_trip() {
    let fx = fixture().await;

    let mut ctx = RequestContext::with_correlation_id("trace-checkout");
    ctx.user_id = Some("alice".to_string());
    let writer = fx.writer.clone();
    ctx.scope(async move {
        writer.info("checkout started", None).await;
        writer.warn("inventory low", None).await;
        let err = anyhow::anyhow!("card declined");
        writer.error_with("payment failed", &err, None).await;
    })
    .await;

    // filtered query through the handler
    let params = logs_api::LogQueryParams {
        correlation_id: Some("trace-checkout".to_string()),
        levels: Some("ERROR".to_string()),
        ..Default::default()
    };
    let response = logs_api::get_logs(State(fx.state.clone()), Query(params))
        .await
        .unwrap();
    assert_eq!(response.0.total, 1);
    let error_entry = &response.0.logs[0];
    assert_eq!(error_entry.message, "payment failed");
    assert_eq!(error_entry.user_id.as_deref(), Some("alice"));
    assert_eq!(error_entry.error_code.as_deref(), Some("card declined"));

    // related lookup returns the whole trace, oldest first
    let related = logs_api::get_related(State(fx.state.clone()), Path(error_entry.id.clone()))
        .await
        .unwrap();
    let messages: Vec<&str> = related.0.logs.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec!["checkout started", "inventory low", "payment failed"]
    );

    // stats over the trace
    let params = logs_api::LogQueryParams {
        correlation_id: Some("trace-checkout".to_string()),
        ..Default::default()
    };
    let stats = logs_api::get_stats(State(fx.state.clone()), Query(params))
        .await
        .unwrap();
    assert_eq!(stats.0.total_count, 3);
    assert_eq!(stats.0.by_level.get("WARN"), Some(&1));
    assert!((stats.0.error_rate - 100.0 / 3.0).abs() < 0.01);
}

#[tokio::test]
async fn related_is_empty_for_entry_without_trace() {
    let fx = fixture().await;

    // written outside any request scope, so no correlation id
    fx.writer.info("orphan entry", None).await;

    let page = logs_api::get_logs(
        State(fx.state.clone()),
        Query(logs_api::LogQueryParams::default()),
    )
    .await
    .unwrap();
    let entry = &page.0.logs[0];
    assert!(entry.correlation_id.is_none());

    let related = logs_api::get_related(State(fx.state.clone()), Path(entry.id.clone()))
        .await
        .unwrap();
    assert!(related.0.logs.is_empty());
}

#[tokio::test]
async fn pagination_over_150_entries() {
    let fx = fixture().await;

    for i in 0..150 {
        fx.writer.info(format!("entry {i}"), None).await;
    }

    let first = logs_api::get_logs(
        State(fx.state.clone()),
        Query(logs_api::LogQueryParams::default()),
    )
    .await
    .unwrap();
    assert_eq!(first.0.logs.len(), 100);
    assert_eq!(first.0.total, 150);
    assert!(first.0.has_more);

    let second = logs_api::get_logs(
        State(fx.state.clone()),
        Query(logs_api::LogQueryParams {
            offset: 100,
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(second.0.logs.len(), 50);
    assert!(!second.0.has_more);

    // no overlap between pages
    let first_ids: Vec<&String> = first.0.logs.iter().map(|e| &e.id).collect();
    assert!(second.0.logs.iter().all(|e| !first_ids.contains(&&e.id)));
}

#[tokio::test]
async fn concurrent_contexts_do_not_bleed() {
    let fx = fixture().await;

    let spawn_writer = |trace: &'static str, user: &'static str| {
        let writer = fx.writer.clone();
        let mut ctx = RequestContext::with_correlation_id(trace);
        ctx.user_id = Some(user.to_string());
        tokio::spawn(ctx.scope(async move {
            for i in 0..20 {
                writer.info(format!("{trace} step {i}"), None).await;
                tokio::task::yield_now().await;
            }
        }))
    };

    let a = spawn_writer("trace-a", "alice");
    let b = spawn_writer("trace-b", "bob");
    a.await.unwrap();
    b.await.unwrap();

    for (trace, user) in [("trace-a", "alice"), ("trace-b", "bob")] {
        let entries = fx.state.store.get_related(trace).await.unwrap();
        assert_eq!(entries.len(), 20);
        assert!(entries.iter().all(|e| e.user_id.as_deref() == Some(user)));
        assert!(entries.iter().all(|e| e.message.starts_with(trace)));
    }
}

#[tokio::test]
async fn live_tail_sees_only_persisted_matching_entries() {
    let fx = fixture().await;

    let mut sub = fx.state.hub.subscribe(StreamFilter {
        levels: vec![Severity::Error, Severity::Critical],
        sources: vec![],
    });

    fx.writer.info("routine", None).await;
    fx.writer.error("broken", None).await;

    let received = sub.recv().await.unwrap();
    assert_eq!(received.level, Severity::Error);

    // the streamed entry is already queryable
    let stored = fx.state.store.get_by_id(&received.id).await.unwrap();
    assert!(stored.is_some());
}

#[tokio::test]
async fn export_lifecycle_through_handlers() {
    let fx = fixture().await;

    for i in 0..10 {
        fx.writer.info(format!("exportable {i}"), None).await;
    }

    let auth = AuthInfo {
        token_name: "ops".to_string(),
    };
    let request: export_api::ExportRequest = serde_json::from_str(
        &format!(r#"{{"levels": ["INFO"], "maxRecords": {}}}"#, EXPORT_HARD_CAP * 10),
    )
    .unwrap();

    let (status, response) = export_api::start_export(
        State(fx.state.clone()),
        Extension(auth),
        axum::Json(request),
    )
    .await
    .unwrap();
    assert_eq!(status, axum::http::StatusCode::ACCEPTED);
    let job_id = response.0.job_id.clone();

    let mut job = None;
    for _ in 0..100 {
        let current = fx.state.exports.get_status(&job_id).await.unwrap().unwrap();
        if current.status != ExportStatus::Pending {
            job = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let job = job.expect("export never completed");
    assert_eq!(job.status, ExportStatus::Completed);
    assert_eq!(job.exported_count, Some(10));
    assert_eq!(job.requested_by.as_deref(), Some("ops"));

    let status = export_api::get_export(State(fx.state.clone()), Path(job_id.clone()))
        .await
        .unwrap();
    assert_eq!(
        status.0.download_url.as_deref(),
        Some(format!("/logs/export/{job_id}/download").as_str())
    );

    let (headers, bytes) =
        export_api::download_export(State(fx.state.clone()), Path(job_id.clone()))
            .await
            .unwrap();
    assert_eq!(headers[0].1, "text/csv");
    let csv = String::from_utf8(bytes).unwrap();
    assert_eq!(csv.lines().count(), 11); // header + 10 rows

    // listed newest-first and visible by id
    let list = export_api::list_exports(
        State(fx.state.clone()),
        Query(export_api::ListExportsParams { limit: 10 }),
    )
    .await
    .unwrap();
    assert_eq!(list.0.jobs[0].id, job_id);

    // unknown job id is a 404
    let missing = export_api::get_export(State(fx.state.clone()), Path("nope".to_string())).await;
    assert!(missing.is_err());
}

#[tokio::test]
async fn retention_boundary_is_strictly_older_than_cutoff() {
    let fx = fixture().await;
    let store = &fx.state.store;

    let day_millis = 24 * 60 * 60 * 1000i64;
    let now = loghub::logs::current_millis();

    // INFO retains 30 days: one entry well past, one just inside the window
    let mut expired = test_entry(Severity::Info, "expired");
    expired.timestamp = now - 31 * day_millis;
    store.insert(&expired).await.unwrap();

    let mut fresh = test_entry(Severity::Info, "fresh");
    fresh.timestamp = now - 29 * day_millis;
    store.insert(&fresh).await.unwrap();

    let deleted = run_sweep_now(store).await.unwrap();
    assert_eq!(deleted, 1);

    assert!(store.get_by_id(&expired.id).await.unwrap().is_none());
    assert!(store.get_by_id(&fresh.id).await.unwrap().is_some());

    // entries land in a query ordered oldest-first after the sweep
    let page = store
        .query_page(&Default::default(), 10, 0, QueryOrder::Asc)
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

fn test_entry(level: Severity, message: &str) -> loghub::logs::LogEntry {
    loghub::logs::LogEntry {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: loghub::logs::current_millis(),
        level,
        source: Source::System,
        message: message.to_string(),
        detail: None,
        correlation_id: None,
        request_id: None,
        user_id: None,
        session_id: None,
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
