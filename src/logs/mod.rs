//! Log ingestion, storage, querying, streaming, export, and retention.
//!
//! Data flow:
//!
//! ```text
//!   LogWriter ──insert──▶ LogStore (SQLite)
//!       │                     │
//!       └──publish──▶ LogBroadcaster ──▶ SSE subscribers
//!                            │
//!   ExportRunner ◀──fetch────┘        retention sweeper ◀── policies
//! ```
//!
//! Entries persist before they broadcast, so live subscribers only ever see
//! durable data.

pub mod broadcast;
pub mod entry;
pub mod export;
pub mod query;
pub mod retention;
pub mod store;
pub mod writer;

pub use broadcast::{LogBroadcaster, StreamFilter, Subscription};
pub use entry::{current_millis, LogEntry, Severity, Source};
pub use export::{ExportJob, ExportRunner, ExportStatus, EXPORT_HARD_CAP};
pub use query::{LogFilter, LogStats, QueryOrder, QueryPage, DEFAULT_PAGE_LIMIT};
pub use retention::{
    run_sweep_now, spawn_retention_sweeper, RetentionPolicy, SweeperConfig, DEFAULT_RETENTION_DAYS,
};
pub use store::LogStore;
pub use writer::{HttpRequestLog, LogWriter};
