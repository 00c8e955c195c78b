use crate::watch_set::{AppId, WatchSet};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Severity bucket of a time-spent warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EscalationTier {
    /// First minute
    Mild,
    /// Up to 3 minutes
    Elevated,
    /// Up to 5 minutes
    Severe,
    /// 5 minutes and beyond; the warning should resist dismissal
    Critical,
}

impl EscalationTier {
    /// Determine the tier from the elapsed seconds computed by the tracker
    #[must_use]
    pub const fn from_elapsed_seconds(elapsed_secs: u64) -> Self {
        match elapsed_secs {
            0..=59 => Self::Mild,
            60..=179 => Self::Elevated,
            180..=299 => Self::Severe,
            _ => Self::Critical,
        }
    }

    /// Persistent warnings stay on screen until acted upon
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        matches!(self, Self::Critical)
    }

    #[must_use]
    pub const fn urgency(&self) -> Urgency {
        match self {
            Self::Mild => Urgency::Low,
            Self::Elevated => Urgency::Normal,
            Self::Severe | Self::Critical => Urgency::Critical,
        }
    }
}

/// Desktop notification urgency, as understood by freedesktop notification daemons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Normal,
    Critical,
}

impl Urgency {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::Critical => "critical",
        }
    }
}

/// Rendered warning, ready for any presentation surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningMessage {
    pub title: String,
    pub body: String,
    pub urgency: Urgency,
    pub persistent: bool,
}

impl WarningMessage {
    /// Warning shown the moment a watched app is opened
    #[must_use]
    pub fn immediate(app_name: &str) -> Self {
        Self {
            title: format!("WARNING - {app_name}"),
            body: format!("Are you sure you want to open {app_name} right now?"),
            urgency: Urgency::Normal,
            persistent: false,
        }
    }

    /// Notice shown once the daemon begins sampling
    #[must_use]
    pub fn started(watched: usize) -> Self {
        Self {
            title: String::from("scrollguard is monitoring"),
            body: format!("Watching {watched} apps. Warnings get louder the longer you stay."),
            urgency: Urgency::Low,
            persistent: false,
        }
    }

    /// Alert shown when the foreground app cannot be determined at all
    #[must_use]
    pub fn source_unavailable(reason: &str) -> Self {
        Self {
            title: String::from("scrollguard cannot see the foreground app"),
            body: format!(
                "No warnings will be sent until this is fixed: {reason}. \
                 Install xprop on X11, or grant Accessibility access to osascript on macOS."
            ),
            urgency: Urgency::Critical,
            persistent: true,
        }
    }

    /// Time-spent warning; wording and urgency escalate with `elapsed_secs`
    #[must_use]
    pub fn time_spent(app_name: &str, elapsed_secs: u64) -> Self {
        let tier = EscalationTier::from_elapsed_seconds(elapsed_secs);
        let minutes = elapsed_secs / 60;
        let seconds = elapsed_secs % 60;

        let title = match tier {
            EscalationTier::Mild => format!("{app_name} - {seconds}s"),
            EscalationTier::Elevated | EscalationTier::Severe => {
                format!("{app_name} - {minutes}min {seconds}s")
            }
            EscalationTier::Critical => format!("STOP {app_name} NOW!"),
        };

        let body = match tier {
            EscalationTier::Mild => format!("You have already spent {seconds}s on {app_name}!"),
            EscalationTier::Elevated => {
                format!("{minutes}min {seconds}s on {app_name}. Stop now!")
            }
            EscalationTier::Severe => {
                format!("WARNING: {minutes}min {seconds}s on {app_name}. That is TOO MUCH!")
            }
            EscalationTier::Critical => {
                format!("CLOSE {app_name} IMMEDIATELY! {minutes}min {seconds}s wasted!")
            }
        };

        Self {
            title,
            body,
            urgency: tier.urgency(),
            persistent: tier.is_persistent(),
        }
    }
}

/// Surface that delivers warnings to the user.
///
/// The scheduler decides when to warn and passes the exact elapsed seconds it
/// computed; implementations only decide how to present them.
#[async_trait]
pub trait EscalationNotifier: Send + Sync {
    /// A watched app was just opened
    async fn warn_immediate(&self, target: &AppId) -> Result<()>;

    /// A session has been running for `elapsed_seconds`
    async fn warn_time_spent(&self, target: &AppId, elapsed_seconds: u64) -> Result<()>;

    /// The session for `target` ended; clear any lingering UI state
    async fn on_session_ended(&self, target: &AppId) -> Result<()> {
        log::debug!("Session ended for {target}");
        Ok(())
    }

    /// The active target changed; `None` means no watched app is in use
    async fn on_status_changed(&self, active: Option<&AppId>) -> Result<()> {
        log::debug!("Active target is now {active:?}");
        Ok(())
    }

    /// Sampling has begun over `watched` apps
    async fn notify_started(&self, watched: usize) -> Result<()> {
        log::info!("Monitoring {watched} apps");
        Ok(())
    }

    /// The foreground source failed its startup check
    async fn warn_source_unavailable(&self, reason: &str) -> Result<()> {
        log::error!("Foreground detection unavailable: {reason}");
        Ok(())
    }
}

/// Which notifier implementation the daemon uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Desktop,
    Log,
}

/// Create the configured notifier
#[must_use]
pub fn create_notifier(kind: NotifierKind, watch_set: WatchSet) -> Box<dyn EscalationNotifier> {
    match kind {
        NotifierKind::Desktop => Box::new(DesktopNotifier::new(watch_set)),
        NotifierKind::Log => Box::new(LogNotifier::new(watch_set)),
    }
}

/// Notifier backed by `notify-send`
pub struct DesktopNotifier {
    watch_set: WatchSet,
}

impl DesktopNotifier {
    #[must_use]
    pub fn new(watch_set: WatchSet) -> Self {
        Self { watch_set }
    }

    fn command_args(message: &WarningMessage) -> Vec<String> {
        let mut args = vec![
            String::from("--app-name=scrollguard"),
            format!("--urgency={}", message.urgency.as_str()),
        ];
        if message.persistent {
            args.push(String::from("--expire-time=0"));
        }
        args.push(message.title.clone());
        args.push(message.body.clone());
        args
    }

    async fn send(message: &WarningMessage) -> Result<()> {
        let status = Command::new("notify-send")
            .args(Self::command_args(message))
            .status()
            .await
            .context("failed to run notify-send")?;
        if !status.success() {
            anyhow::bail!("notify-send exited with {status}");
        }
        log::debug!("Notification sent: {}", message.title);
        Ok(())
    }
}

#[async_trait]
impl EscalationNotifier for DesktopNotifier {
    async fn warn_immediate(&self, target: &AppId) -> Result<()> {
        Self::send(&WarningMessage::immediate(self.watch_set.label(target))).await
    }

    async fn warn_time_spent(&self, target: &AppId, elapsed_seconds: u64) -> Result<()> {
        Self::send(&WarningMessage::time_spent(
            self.watch_set.label(target),
            elapsed_seconds,
        ))
        .await
    }

    async fn notify_started(&self, watched: usize) -> Result<()> {
        Self::send(&WarningMessage::started(watched)).await
    }

    async fn warn_source_unavailable(&self, reason: &str) -> Result<()> {
        Self::send(&WarningMessage::source_unavailable(reason)).await
    }
}

/// Notifier that only writes warnings to the log
pub struct LogNotifier {
    watch_set: WatchSet,
}

impl LogNotifier {
    #[must_use]
    pub fn new(watch_set: WatchSet) -> Self {
        Self { watch_set }
    }
}

#[async_trait]
impl EscalationNotifier for LogNotifier {
    async fn warn_immediate(&self, target: &AppId) -> Result<()> {
        let message = WarningMessage::immediate(self.watch_set.label(target));
        log::warn!("{}: {}", message.title, message.body);
        Ok(())
    }

    async fn warn_time_spent(&self, target: &AppId, elapsed_seconds: u64) -> Result<()> {
        let message = WarningMessage::time_spent(self.watch_set.label(target), elapsed_seconds);
        log::warn!(
            "[{}] {}: {}",
            message.urgency.as_str(),
            message.title,
            message.body
        );
        Ok(())
    }

    async fn on_status_changed(&self, active: Option<&AppId>) -> Result<()> {
        match active {
            Some(target) => log::info!("Status: {} in use", self.watch_set.label(target)),
            None => log::info!("Status: no watched app in use"),
        }
        Ok(())
    }
}
