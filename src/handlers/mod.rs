pub mod export_api;
pub mod health;
pub mod logs_api;
pub mod stream_api;

use crate::config::Config;
use crate::logs::{ExportRunner, LogBroadcaster, LogStore, LogWriter};
use std::sync::Arc;

/// Shared state for the log API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<LogStore>,
    pub hub: Arc<LogBroadcaster>,
    /// Writer used by the instrumentation middleware for completion entries.
    pub request_writer: LogWriter,
    pub exports: ExportRunner,
}
