use crate::watch_set::AppId;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "linux")]
pub mod linux;

/// Kind of a foreground usage event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageEventKind {
    ActivityResumed,
    MoveToForeground,
    ActivityPaused,
    Other,
}

impl UsageEventKind {
    /// Whether this event means the app took display focus
    #[must_use]
    pub const fn is_foreground(&self) -> bool {
        matches!(self, Self::ActivityResumed | Self::MoveToForeground)
    }
}

/// A single foreground transition reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEvent {
    pub app_id: AppId,
    pub kind: UsageEventKind,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate usage statistic: when an app was last in use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageStat {
    pub app_id: AppId,
    pub last_time_used: DateTime<Utc>,
}

/// Platform source of usage events and statistics
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Foreground events with timestamps in `[start, end]`
    async fn query_events(&self, start: DateTime<Utc>, end: DateTime<Utc>)
        -> Result<Vec<UsageEvent>>;

    /// Last-used statistics for apps used in `[start, end]`
    async fn query_usage_stats(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageStat>>;

    /// Verify the platform backend can be queried at all
    async fn check(&self) -> Result<()>;
}

/// Rolling record of sampled foreground apps.
///
/// Desktop platforms only expose "what is focused now", so the adapters poll
/// and turn changes of the focused app into synthetic `MoveToForeground`
/// events that the usage classifier can window over.
#[derive(Debug, Default)]
pub struct ForegroundHistory {
    events: VecDeque<UsageEvent>,
    last_seen: HashMap<AppId, DateTime<Utc>>,
    current: Option<AppId>,
}

/// Events older than this are dropped on every sample
const HISTORY_RETENTION_SECS: i64 = 300;

impl ForegroundHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample of the focused app (or none)
    pub fn record(&mut self, focused: Option<AppId>, now: DateTime<Utc>) {
        if let Some(app) = &focused {
            self.last_seen.insert(app.clone(), now);
            if self.current.as_ref() != Some(app) {
                self.events.push_back(UsageEvent {
                    app_id: app.clone(),
                    kind: UsageEventKind::MoveToForeground,
                    timestamp: now,
                });
            }
        }
        self.current = focused;

        let cutoff = now - chrono::Duration::seconds(HISTORY_RETENTION_SECS);
        while self.events.front().is_some_and(|e| e.timestamp < cutoff) {
            self.events.pop_front();
        }
        self.last_seen.retain(|_, seen| *seen >= cutoff);
    }

    #[must_use]
    pub fn events_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<UsageEvent> {
        self.events
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn stats_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<UsageStat> {
        self.last_seen
            .iter()
            .filter(|(_, seen)| **seen >= start && **seen <= end)
            .map(|(app_id, seen)| UsageStat {
                app_id: app_id.clone(),
                last_time_used: *seen,
            })
            .collect()
    }
}

/// Create platform-specific usage source
///
/// # Errors
///
/// Returns an error if the current platform is not supported or if source initialization fails
pub fn create_usage_source() -> Result<Box<dyn UsageSource>> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(macos::MacOSUsageSource::new()?))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::LinuxUsageSource::new()?))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        anyhow::bail!("Unsupported platform")
    }
}
