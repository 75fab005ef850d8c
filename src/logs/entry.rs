//! Log entry data model
//!
//! A `LogEntry` is an immutable fact: created once by the writer, never
//! updated, deleted only by the retention sweeper. Severity and source are
//! closed enumerations; anything else is a validation failure at the edge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Rejected token for one of the closed enumerations.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} token: {token}")]
pub struct UnknownToken {
    pub kind: &'static str,
    pub token: String,
}

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

/// All severities, in ascending order. Used by the retention sweeper to
/// resolve a policy for every level.
pub const ALL_SEVERITIES: [Severity; 5] = [
    Severity::Debug,
    Severity::Info,
    Severity::Warn,
    Severity::Error,
    Severity::Critical,
];

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    /// Severity for an HTTP completion entry, derived from the status code:
    /// 5xx is an error, 4xx a warning, everything else informational.
    pub fn for_status(status: u16) -> Self {
        match status {
            s if s >= 500 => Self::Error,
            s if s >= 400 => Self::Warn,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(UnknownToken {
                kind: "severity",
                token: s.to_string(),
            }),
        }
    }
}

/// Subsystem that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    Web,
    Api,
    Ai,
    Database,
    Workflow,
    Scheduler,
    Background,
    System,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "WEB",
            Self::Api => "API",
            Self::Ai => "AI",
            Self::Database => "DATABASE",
            Self::Workflow => "WORKFLOW",
            Self::Scheduler => "SCHEDULER",
            Self::Background => "BACKGROUND",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WEB" => Ok(Self::Web),
            "API" => Ok(Self::Api),
            "AI" => Ok(Self::Ai),
            "DATABASE" => Ok(Self::Database),
            "WORKFLOW" => Ok(Self::Workflow),
            "SCHEDULER" => Ok(Self::Scheduler),
            "BACKGROUND" => Ok(Self::Background),
            "SYSTEM" => Ok(Self::System),
            _ => Err(UnknownToken {
                kind: "source",
                token: s.to_string(),
            }),
        }
    }
}

/// A persisted log entry.
///
/// `error_code`/`stack_trace` are populated together or not at all, as are
/// the HTTP fields (`method`/`path`/`status_code`/`duration_ms`). The writer
/// is the only constructor, so those pairings hold by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    /// Unix milliseconds, assigned at write time.
    pub timestamp: i64,
    pub level: Severity,
    pub source: Source,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// Current time as Unix milliseconds, the timestamp basis for all entries.
pub fn current_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as i64
}
