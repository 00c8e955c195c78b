//! Sampling scheduler.
//!
//! Drives the session tracker at a fixed cadence from a single task. Ticks
//! never overlap: each tick, including its notifier calls, finishes before the
//! next one is scheduled, so [`DetectionState`] is owned here without locking.
//! Host commands are handled between ticks and never cancel one in flight.

use crate::classifier::ForegroundClassifier;
use crate::config::MonitorConfig;
use crate::notifier::EscalationNotifier;
use crate::session_tracker::{Action, DetectionState, SessionTracker};
use crate::watch_set::{AppId, WatchSet};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};

const COMMAND_QUEUE_DEPTH: usize = 16;

/// Longest delay the loop schedules; keeps deadline arithmetic in range
const MAX_DELAY: Duration = Duration::from_secs(86_400);

fn deadline_after(delay: Duration) -> Instant {
    Instant::now() + delay.min(MAX_DELAY)
}

/// Timing knobs for the sampling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub sampling_period: Duration,
    /// Delay before the next tick after a failed one
    pub backoff: Duration,
    pub classifier_timeout: Duration,
    pub notifier_timeout: Duration,
    pub health_check_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for SchedulerConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            sampling_period: config.sampling_period(),
            backoff: config.backoff(),
            classifier_timeout: config.classifier_timeout(),
            notifier_timeout: config.notifier_timeout(),
            health_check_interval: config.health_check_interval(),
        }
    }
}

/// Failure of a single tick; the loop logs it and backs off
#[derive(Debug, Error)]
pub enum TickError {
    #[error("classifier did not answer within {0:?}")]
    ClassifierTimeout(Duration),
    #[error("notifier did not answer within {0:?}")]
    NotifierTimeout(Duration),
    #[error("notifier failed: {0:#}")]
    Notifier(anyhow::Error),
}

/// Point-in-time view of the scheduler, for status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub active_target: Option<String>,
    pub active_name: Option<String>,
    pub session_seconds: u64,
    pub missed_ticks: u32,
    pub last_detection: Option<DateTime<Utc>>,
    pub ticks: u64,
    pub faults: u64,
}

impl StatusSnapshot {
    /// Snapshot reported when no daemon answers
    #[must_use]
    pub fn stopped() -> Self {
        Self {
            running: false,
            active_target: None,
            active_name: None,
            session_seconds: 0,
            missed_ticks: 0,
            last_detection: None,
            ticks: 0,
            faults: 0,
        }
    }
}

#[derive(Debug)]
pub enum SchedulerCommand {
    Stop,
    /// Clear detection state without stopping the loop
    Restart,
    /// Send an immediate warning directly, bypassing the tracker
    ForceWarn {
        target: AppId,
        reply: oneshot::Sender<Result<(), String>>,
    },
    Status {
        reply: oneshot::Sender<StatusSnapshot>,
    },
}

/// Cloneable control handle for a running [`Scheduler`]
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    async fn send(&self, command: SchedulerCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("scheduler is not running"))
    }

    /// # Errors
    ///
    /// Returns an error if the scheduler has already stopped
    pub async fn stop(&self) -> Result<()> {
        self.send(SchedulerCommand::Stop).await
    }

    /// # Errors
    ///
    /// Returns an error if the scheduler has already stopped
    pub async fn restart(&self) -> Result<()> {
        self.send(SchedulerCommand::Restart).await
    }

    /// # Errors
    ///
    /// Returns an error if the scheduler has stopped or the notifier fails
    pub async fn force_warn(&self, target: AppId) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(SchedulerCommand::ForceWarn { target, reply }).await?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("scheduler dropped the request"))?
            .map_err(|e| anyhow::anyhow!(e))
    }

    /// # Errors
    ///
    /// Returns an error if the scheduler has already stopped
    pub async fn status(&self) -> Result<StatusSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(SchedulerCommand::Status { reply }).await?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("scheduler dropped the request"))
    }
}

#[derive(Debug, Default)]
struct TickStats {
    ticks: u64,
    faults: u64,
}

pub struct Scheduler {
    config: SchedulerConfig,
    tracker: SessionTracker,
    state: DetectionState,
    classifier: Box<dyn ForegroundClassifier>,
    notifier: Box<dyn EscalationNotifier>,
    commands: mpsc::Receiver<SchedulerCommand>,
    stats: TickStats,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        tracker: SessionTracker,
        classifier: Box<dyn ForegroundClassifier>,
        notifier: Box<dyn EscalationNotifier>,
    ) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let scheduler = Self {
            config,
            tracker,
            state: DetectionState::new(),
            classifier,
            notifier,
            commands: rx,
            stats: TickStats::default(),
        };
        (scheduler, SchedulerHandle { commands: tx })
    }

    #[must_use]
    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    /// Run until a stop command arrives or every handle is dropped
    pub async fn run(mut self) {
        log::info!(
            "Sampling every {:?}, watching {} apps",
            self.config.sampling_period,
            self.tracker.watch_set().len()
        );
        self.announce().await;

        let health_period = self
            .config
            .health_check_interval
            .clamp(Duration::from_secs(1), MAX_DELAY);
        let mut health = interval_at(deadline_after(health_period), health_period);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_tick = Instant::now();

        loop {
            tokio::select! {
                () = sleep_until(next_tick) => {
                    let delay = match self.tick(Utc::now()).await {
                        Ok(_) => self.config.sampling_period,
                        Err(e) => {
                            self.stats.faults += 1;
                            log::error!(
                                "Sampling tick failed: {e}; next tick in {:?}",
                                self.config.backoff
                            );
                            self.config.backoff
                        }
                    };
                    next_tick = deadline_after(delay);
                }
                _ = health.tick() => self.log_health(),
                command = self.commands.recv() => match command {
                    Some(SchedulerCommand::Stop) => {
                        log::info!("Stop requested");
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        log::info!("All scheduler handles dropped");
                        break;
                    }
                },
            }
        }

        self.state.reset();
        log::info!(
            "Sampling stopped after {} ticks ({} faults)",
            self.stats.ticks,
            self.stats.faults
        );
    }

    /// Check the classifier can see anything, then post the started notice.
    ///
    /// An unusable source is reported once here; the loop still runs so it
    /// picks up a source that becomes available later.
    async fn announce(&mut self) {
        let limit = self.config.classifier_timeout;
        let available = match timeout(limit, self.classifier.check_available()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("availability check timed out after {limit:?}")),
        };

        let notifier_limit = self.config.notifier_timeout;
        if let Err(e) = available {
            let reason = format!("{e:#}");
            log::error!("Foreground detection unavailable: {reason}");
            if let Err(e) =
                bounded(notifier_limit, self.notifier.warn_source_unavailable(&reason)).await
            {
                log::error!("Failed to report unavailable foreground detection: {e}");
            }
        }

        let watched = self.tracker.watch_set().len();
        if let Err(e) = bounded(notifier_limit, self.notifier.notify_started(watched)).await {
            log::warn!("Failed to send started notice: {e}");
        }
    }

    /// Run one classifier, tracker and notifier pass at `now`
    ///
    /// # Errors
    ///
    /// Returns an error if the classifier times out, or if the notifier fails
    /// or times out. A notifier failure leaves the already-updated detection
    /// state in place; the action is not retried.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<Action, TickError> {
        self.stats.ticks += 1;

        let limit = self.config.classifier_timeout;
        let detected = timeout(limit, self.classifier.resolve_foreground_app(now))
            .await
            .map_err(|_| TickError::ClassifierTimeout(limit))?;

        let action = self.tracker.on_tick(&mut self.state, detected.as_ref(), now);
        dispatch(
            self.notifier.as_ref(),
            self.tracker.watch_set(),
            self.config.notifier_timeout,
            &action,
        )
        .await?;
        Ok(action)
    }

    async fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::Restart => {
                log::info!("Restart requested, clearing detection state");
                self.state.reset();
            }
            SchedulerCommand::ForceWarn { target, reply } => {
                log::info!("Forcing immediate warning for {target}");
                let result = bounded(
                    self.config.notifier_timeout,
                    self.notifier.warn_immediate(&target),
                )
                .await
                .map_err(|e| e.to_string());
                if reply.send(result).is_err() {
                    log::debug!("Force-warn requester went away");
                }
            }
            SchedulerCommand::Status { reply } => {
                if reply.send(self.snapshot(Utc::now())).is_err() {
                    log::debug!("Status requester went away");
                }
            }
            SchedulerCommand::Stop => {}
        }
    }

    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> StatusSnapshot {
        let session = self.state.session();
        StatusSnapshot {
            running: true,
            active_target: session.map(|s| s.target.to_string()),
            active_name: session
                .and_then(|s| self.tracker.watch_set().display_name(&s.target))
                .map(String::from),
            session_seconds: session.map_or(0, |s| s.elapsed_seconds(now)),
            missed_ticks: self.state.missed_ticks(),
            last_detection: self.state.last_detection(),
            ticks: self.stats.ticks,
            faults: self.stats.faults,
        }
    }

    fn log_health(&self) {
        log::info!(
            "Health: {} ticks, {} faults, active: {}, last detection: {}",
            self.stats.ticks,
            self.stats.faults,
            self.state
                .active_target()
                .map_or_else(|| String::from("none"), ToString::to_string),
            self.state
                .last_detection()
                .map_or_else(|| String::from("never"), |t| t.to_rfc3339())
        );
    }
}

async fn bounded(
    limit: Duration,
    call: impl Future<Output = Result<()>>,
) -> Result<(), TickError> {
    match timeout(limit, call).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TickError::Notifier(e)),
        Err(_) => Err(TickError::NotifierTimeout(limit)),
    }
}

async fn dispatch(
    notifier: &dyn EscalationNotifier,
    watch_set: &WatchSet,
    limit: Duration,
    action: &Action,
) -> Result<(), TickError> {
    match action {
        Action::StartSession { target, previous } => {
            let cleanup = match previous {
                Some(previous) => {
                    log::info!("Session on {} replaced", watch_set.label(previous));
                    bounded(limit, notifier.on_session_ended(previous)).await
                }
                None => Ok(()),
            };
            log::info!("New session on {} ({target})", watch_set.label(target));
            let warned = bounded(limit, notifier.warn_immediate(target)).await;
            refresh_status(notifier, limit, Some(target)).await;
            // the warning is sent even when cleanup of the old session failed
            warned.and(cleanup)
        }
        Action::SendWarning {
            target,
            elapsed_seconds,
        } => {
            log::info!(
                "{} in use for {elapsed_seconds}s, sending warning",
                watch_set.label(target)
            );
            bounded(limit, notifier.warn_time_spent(target, *elapsed_seconds)).await
        }
        Action::EndSession { target } => {
            log::info!("Session on {} ended", watch_set.label(target));
            let ended = bounded(limit, notifier.on_session_ended(target)).await;
            refresh_status(notifier, limit, None).await;
            ended
        }
        Action::NoAction => Ok(()),
    }
}

/// Status display is cosmetic; its failures are logged, never tick faults
async fn refresh_status(
    notifier: &dyn EscalationNotifier,
    limit: Duration,
    active: Option<&AppId>,
) {
    if let Err(e) = bounded(limit, notifier.on_status_changed(active)).await {
        log::warn!("Status refresh failed: {e}");
    }
}
