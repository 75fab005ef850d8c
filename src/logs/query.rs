//! Filter and result types shared by the query path, the export runner, and
//! the HTTP handlers.

use super::entry::{LogEntry, Severity, Source};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default page size for log queries.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Filter criteria for log queries.
///
/// Dimensions combine with AND; an empty `levels`/`sources` set means no
/// filtering on that dimension. `keyword` is a case-insensitive substring
/// match against message, correlation id, and error code (OR across the
/// three).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogFilter {
    /// Start of the time range, Unix milliseconds (inclusive).
    pub start_time: Option<i64>,
    /// End of the time range, Unix milliseconds (inclusive).
    pub end_time: Option<i64>,
    pub levels: Vec<Severity>,
    pub sources: Vec<Source>,
    pub keyword: Option<String>,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
    pub request_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub status_code: Option<i64>,
}

/// Display order for query pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryOrder {
    Asc,
    #[default]
    Desc,
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
pub struct QueryPage {
    pub entries: Vec<LogEntry>,
    /// Count of all matching entries, regardless of page.
    pub total: u64,
    pub has_more: bool,
}

/// Aggregate statistics over a filter.
///
/// `error_rate` is the percentage of ERROR/CRITICAL entries among the total,
/// 0 for an empty set. `avg_duration_ms` averages only entries that carry a
/// duration; entries without HTTP fields do not drag it toward zero.
#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub total_count: u64,
    pub by_level: BTreeMap<String, u64>,
    pub by_source: BTreeMap<String, u64>,
    pub error_rate: f64,
    pub avg_duration_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_is_newest_first() {
        assert_eq!(QueryOrder::default(), QueryOrder::Desc);
    }

    #[test]
    fn empty_filter_has_no_dimensions() {
        let filter = LogFilter::default();
        assert!(filter.levels.is_empty());
        assert!(filter.sources.is_empty());
        assert!(filter.keyword.is_none());
    }

    #[test]
    fn filter_round_trips_through_json() {
        let filter = LogFilter {
            levels: vec![Severity::Error, Severity::Critical],
            keyword: Some("timeout".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&filter).unwrap();
        let back: LogFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(back.levels, filter.levels);
        assert_eq!(back.keyword.as_deref(), Some("timeout"));
    }
}
