use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tokio::process::Command;

use super::{ForegroundHistory, UsageEvent, UsageSource, UsageStat};
use crate::watch_set::AppId;

const FRONTMOST_BUNDLE_SCRIPT: &str = r#"
    tell application "System Events"
        set frontProc to first application process whose frontmost is true
        return bundle identifier of frontProc
    end tell
"#;

/// macOS usage source; the application ID is the frontmost bundle identifier
pub struct MacOSUsageSource {
    history: Mutex<ForegroundHistory>,
}

impl MacOSUsageSource {
    /// Create a new macOS usage source
    ///
    /// # Errors
    ///
    /// Currently always succeeds, but returns `Result` for consistency with other platforms
    pub fn new() -> Result<Self> {
        Ok(Self {
            history: Mutex::new(ForegroundHistory::new()),
        })
    }

    async fn frontmost_bundle_id() -> Result<Option<AppId>> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(FRONTMOST_BUNDLE_SCRIPT)
            .output()
            .await
            .context("failed to run osascript")?;

        if !output.status.success() {
            anyhow::bail!("osascript exited with {}", output.status);
        }

        let bundle_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if bundle_id.is_empty() || bundle_id == "missing value" {
            return Ok(None);
        }
        Ok(Some(AppId::from(bundle_id)))
    }
}

#[async_trait]
impl UsageSource for MacOSUsageSource {
    async fn query_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>> {
        let focused = Self::frontmost_bundle_id().await?;
        let mut history = self
            .history
            .lock()
            .map_err(|_| anyhow::anyhow!("foreground history lock poisoned"))?;
        history.record(focused, end);
        Ok(history.events_between(start, end))
    }

    async fn query_usage_stats(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageStat>> {
        let history = self
            .history
            .lock()
            .map_err(|_| anyhow::anyhow!("foreground history lock poisoned"))?;
        Ok(history.stats_between(start, end))
    }

    async fn check(&self) -> Result<()> {
        Self::frontmost_bundle_id().await.map(|_| ())
    }
}
