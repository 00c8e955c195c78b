use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::Mutex;
use tokio::process::Command;

use super::{ForegroundHistory, UsageEvent, UsageSource, UsageStat};
use crate::watch_set::AppId;

/// X11 usage source backed by `xprop`.
///
/// The application ID is the `WM_CLASS` class name of the focused window.
pub struct LinuxUsageSource {
    history: Mutex<ForegroundHistory>,
    window_id: Regex,
    quoted: Regex,
}

impl LinuxUsageSource {
    /// Create a new Linux usage source
    ///
    /// # Errors
    ///
    /// Returns an error if the `xprop` output patterns fail to compile
    pub fn new() -> Result<Self> {
        Ok(Self {
            history: Mutex::new(ForegroundHistory::new()),
            window_id: Regex::new(r"window id # (0x[0-9a-fA-F]+)")?,
            quoted: Regex::new(r#""([^"]*)""#)?,
        })
    }

    /// Parse `_NET_ACTIVE_WINDOW(WINDOW): window id # 0x3a00007`
    fn parse_active_window(&self, output: &str) -> Option<String> {
        let id = self.window_id.captures(output)?.get(1)?.as_str();
        // 0x0 means nothing is focused
        (id != "0x0").then(|| id.to_string())
    }

    /// Parse `WM_CLASS(STRING) = "Navigator", "firefox"`; the class is the last entry
    fn parse_wm_class(&self, output: &str) -> Option<AppId> {
        self.quoted
            .captures_iter(output)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .last()
            .map(AppId::from)
    }

    async fn xprop(args: &[&str]) -> Result<String> {
        let output = Command::new("xprop")
            .args(args)
            .output()
            .await
            .context("failed to run xprop")?;
        if !output.status.success() {
            anyhow::bail!("xprop exited with {}", output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn focused_app(&self) -> Result<Option<AppId>> {
        let root = Self::xprop(&["-root", "_NET_ACTIVE_WINDOW"]).await?;
        let Some(window) = self.parse_active_window(&root) else {
            return Ok(None);
        };
        let class = Self::xprop(&["-id", &window, "WM_CLASS"]).await?;
        Ok(self.parse_wm_class(&class))
    }

    async fn sample(&self, now: DateTime<Utc>) -> Result<()> {
        let focused = self.focused_app().await?;
        log::trace!("Focused app: {focused:?}");
        self.history
            .lock()
            .map_err(|_| anyhow::anyhow!("foreground history lock poisoned"))?
            .record(focused, now);
        Ok(())
    }
}

#[async_trait]
impl UsageSource for LinuxUsageSource {
    async fn query_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>> {
        self.sample(end).await?;
        let history = self
            .history
            .lock()
            .map_err(|_| anyhow::anyhow!("foreground history lock poisoned"))?;
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
        Self::xprop(&["-root", "_NET_ACTIVE_WINDOW"]).await.map(|_| ())
    }
}
