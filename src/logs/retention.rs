//! Retention policies and the background sweeper
//!
//! Each severity can carry its own retention window. The sweeper runs once
//! per day at a configured hour and deletes entries older than each level's
//! window; levels without a policy fall back to the default window, and
//! disabled policies exempt their level entirely.

use super::entry::{Severity, ALL_SEVERITIES};
use super::store::LogStore;
use anyhow::Result;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Retention window applied when a level has no stored policy.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Per-severity retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub level: Severity,
    pub retention_days: i64,
    pub enabled: bool,
}

impl LogStore {
    /// All stored policies.
    pub async fn retention_policies(&self) -> Result<Vec<RetentionPolicy>> {
        let rows = sqlx::query("SELECT level, retention_days, enabled FROM retention_policies ORDER BY level")
            .fetch_all(self.pool())
            .await?;

        rows.iter()
            .map(|row| {
                let level: String = row.get("level");
                Ok(RetentionPolicy {
                    level: level.parse()?,
                    retention_days: row.get("retention_days"),
                    enabled: row.get("enabled"),
                })
            })
            .collect()
    }

    /// Insert or replace the policy for one level.
    pub async fn set_retention_policy(&self, policy: &RetentionPolicy) -> Result<()> {
        sqlx::query(
            "INSERT INTO retention_policies (level, retention_days, enabled) VALUES (?, ?, ?)
             ON CONFLICT(level) DO UPDATE SET retention_days = excluded.retention_days,
                                              enabled = excluded.enabled",
        )
        .bind(policy.level.as_str())
        .bind(policy.retention_days)
        .bind(policy.enabled)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Remove the policy for one level; the level then uses the default
    /// window again.
    pub async fn delete_retention_policy(&self, level: Severity) -> Result<()> {
        sqlx::query("DELETE FROM retention_policies WHERE level = ?")
            .bind(level.as_str())
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

/// Sweeper schedule.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Local hour of day (0-23) at which the daily sweep runs.
    pub sweep_hour: u32,
    /// How often to check whether the sweep hour has arrived.
    pub check_interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            sweep_hour: 3,
            check_interval: Duration::from_secs(3600),
        }
    }
}

/// Spawn the daily retention sweeper.
pub fn spawn_retention_sweeper(store: Arc<LogStore>, config: SweeperConfig) -> JoinHandle<()> {
    tokio::spawn(sweep_loop(store, config))
}

async fn sweep_loop(store: Arc<LogStore>, config: SweeperConfig) {
    let mut interval = tokio::time::interval(config.check_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // day-of-year latch so the sweep runs at most once per day
    let mut last_sweep_day: Option<u32> = None;

    loop {
        interval.tick().await;

        let now = chrono::Local::now();
        let today = chrono::Datelike::ordinal(&now);
        if now.hour() != config.sweep_hour || last_sweep_day == Some(today) {
            continue;
        }

        match run_sweep_now(&store).await {
            Ok(deleted) => {
                last_sweep_day = Some(today);
                tracing::info!(deleted, "Retention sweep completed");
            }
            Err(err) => {
                tracing::error!(error = ?err, "Retention sweep failed");
            }
        }
    }
}

/// Run one retention sweep immediately. Returns total entries deleted.
pub async fn run_sweep_now(store: &LogStore) -> Result<u64> {
    let policies: HashMap<Severity, RetentionPolicy> = store
        .retention_policies()
        .await?
        .into_iter()
        .map(|p| (p.level, p))
        .collect();

    let now = super::entry::current_millis();
    let mut total = 0u64;

    for level in ALL_SEVERITIES {
        let days = match policies.get(&level) {
            Some(p) if !p.enabled => continue,
            Some(p) => p.retention_days,
            None => DEFAULT_RETENTION_DAYS,
        };

        let cutoff = now - days * MILLIS_PER_DAY;
        let deleted = store.delete_older_than(level, cutoff).await?;
        if deleted > 0 {
            tracing::debug!(level = %level, deleted, "Expired log entries removed");
        }
        total += deleted;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::entry::{current_millis, LogEntry, Source};

    async fn store_fixture() -> Arc<LogStore> {
        Arc::new(LogStore::new("sqlite::memory:").await.unwrap())
    }

    fn aged_entry(level: Severity, age_days: i64) -> LogEntry {
        LogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: current_millis() - age_days * MILLIS_PER_DAY,
            level,
            source: Source::System,
            message: format!("{level} aged {age_days}d"),
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

    #[tokio::test]
    async fn seeded_policies_cover_every_severity() {
        let store = store_fixture().await;
        let policies = store.retention_policies().await.unwrap();
        assert_eq!(policies.len(), ALL_SEVERITIES.len());

        let debug = policies.iter().find(|p| p.level == Severity::Debug).unwrap();
        assert_eq!(debug.retention_days, 7);
        let critical = policies.iter().find(|p| p.level == Severity::Critical).unwrap();
        assert_eq!(critical.retention_days, 180);
        assert!(policies.iter().all(|p| p.enabled));
    }

    #[tokio::test]
    async fn sweep_respects_per_severity_windows() {
        let store = store_fixture().await;

        // DEBUG window is 7 days, ERROR is 90
        store.insert(&aged_entry(Severity::Debug, 10)).await.unwrap();
        store.insert(&aged_entry(Severity::Error, 10)).await.unwrap();
        store.insert(&aged_entry(Severity::Error, 100)).await.unwrap();

        let deleted = run_sweep_now(&store).await.unwrap();
        assert_eq!(deleted, 2);

        let remaining = store
            .query_page(&Default::default(), 10, 0, Default::default())
            .await
            .unwrap();
        assert_eq!(remaining.total, 1);
        assert_eq!(remaining.entries[0].level, Severity::Error);
    }

    #[tokio::test]
    async fn disabled_policy_is_skipped() {
        let store = store_fixture().await;
        store
            .set_retention_policy(&RetentionPolicy {
                level: Severity::Debug,
                retention_days: 7,
                enabled: false,
            })
            .await
            .unwrap();

        store.insert(&aged_entry(Severity::Debug, 400)).await.unwrap();

        let deleted = run_sweep_now(&store).await.unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn missing_policy_falls_back_to_default_window() {
        let store = store_fixture().await;
        store.delete_retention_policy(Severity::Warn).await.unwrap();

        store.insert(&aged_entry(Severity::Warn, DEFAULT_RETENTION_DAYS + 5)).await.unwrap();
        store.insert(&aged_entry(Severity::Warn, DEFAULT_RETENTION_DAYS - 5)).await.unwrap();

        let deleted = run_sweep_now(&store).await.unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let store = store_fixture().await;
        store.insert(&aged_entry(Severity::Debug, 10)).await.unwrap();

        assert_eq!(run_sweep_now(&store).await.unwrap(), 1);
        assert_eq!(run_sweep_now(&store).await.unwrap(), 0);
    }
}
