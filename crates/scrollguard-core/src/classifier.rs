use crate::monitor::UsageSource;
use crate::watch_set::{AppId, WatchSet};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

/// Trailing window inspected on every query
pub const DEFAULT_WINDOW_SECS: i64 = 5;

/// Resolves which application currently owns the foreground.
///
/// Implementations must never fail: platform errors map to `None`, which the
/// session tracker treats as "unknown", not "nothing in front".
#[async_trait]
pub trait ForegroundClassifier: Send + Sync {
    async fn resolve_foreground_app(&self, window_end: DateTime<Utc>) -> Option<AppId>;

    /// Checked once at startup; an error means every query would come back `None`
    async fn check_available(&self) -> Result<()> {
        Ok(())
    }
}

/// Logs a failing query once per outage rather than on every tick
#[derive(Debug)]
struct FailureLatch {
    what: &'static str,
    failing: AtomicBool,
}

impl FailureLatch {
    const fn new(what: &'static str) -> Self {
        Self {
            what,
            failing: AtomicBool::new(false),
        }
    }

    /// Returns `true` when this failure starts a new outage
    fn failed(&self, e: &anyhow::Error) -> bool {
        let first = !self.failing.swap(true, Ordering::Relaxed);
        if first {
            log::warn!("{} query failed: {e:#}; repeats are logged at trace", self.what);
        } else {
            log::trace!("{} query still failing: {e:#}", self.what);
        }
        first
    }

    /// Returns `true` when this success ends an outage
    fn succeeded(&self) -> bool {
        let recovered = self.failing.swap(false, Ordering::Relaxed);
        if recovered {
            log::info!("{} query recovered", self.what);
        }
        recovered
    }
}

/// Classifier over a platform [`UsageSource`].
///
/// Priority: latest foreground event in the window > most recent watched app
/// in usage stats > most recent app in usage stats
pub struct UsageClassifier {
    source: Box<dyn UsageSource>,
    watch_set: WatchSet,
    window: Duration,
    events_latch: FailureLatch,
    stats_latch: FailureLatch,
}

impl UsageClassifier {
    #[must_use]
    pub fn new(source: Box<dyn UsageSource>, watch_set: WatchSet) -> Self {
        Self {
            source,
            watch_set,
            window: Duration::seconds(DEFAULT_WINDOW_SECS),
            events_latch: FailureLatch::new("Usage event"),
            stats_latch: FailureLatch::new("Usage stats"),
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    async fn from_events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<AppId> {
        let events = match self.source.query_events(start, end).await {
            Ok(events) => {
                self.events_latch.succeeded();
                events
            }
            Err(e) => {
                self.events_latch.failed(&e);
                return None;
            }
        };

        let mut latest: Option<(DateTime<Utc>, AppId)> = None;
        for event in events.into_iter().filter(|e| e.kind.is_foreground()) {
            // strictly newer only: the first of equal timestamps wins
            if latest.as_ref().map_or(true, |(ts, _)| event.timestamp > *ts) {
                latest = Some((event.timestamp, event.app_id));
            }
        }
        latest.map(|(_, app)| app)
    }

    async fn from_usage_stats(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<AppId> {
        let mut stats = match self.source.query_usage_stats(start, end).await {
            Ok(stats) => {
                self.stats_latch.succeeded();
                stats
            }
            Err(e) => {
                self.stats_latch.failed(&e);
                return None;
            }
        };
        stats.retain(|s| s.last_time_used >= start);
        stats.sort_by(|a, b| b.last_time_used.cmp(&a.last_time_used));

        stats
            .iter()
            .find(|s| self.watch_set.contains(&s.app_id))
            .or_else(|| stats.first())
            .map(|s| s.app_id.clone())
    }
}

#[async_trait]
impl ForegroundClassifier for UsageClassifier {
    async fn resolve_foreground_app(&self, window_end: DateTime<Utc>) -> Option<AppId> {
        let start = window_end
            .checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        if let Some(app) = self.from_events(start, window_end).await {
            return Some(app);
        }
        log::trace!("No foreground event in window, falling back to usage stats");
        self.from_usage_stats(start, window_end).await
    }

    async fn check_available(&self) -> Result<()> {
        self.source.check().await
    }
}
