//! Session state machine for watched foreground apps.
//!
//! `SessionTracker` is a deterministic reducer: each tick it takes the
//! classifier's verdict and the current time, mutates the caller-owned
//! [`DetectionState`] and returns the [`Action`] the scheduler should dispatch.
//! It never performs I/O, so it cannot fail.

use crate::interval::IntervalPolicy;
use crate::watch_set::{AppId, WatchSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consecutive inconclusive ticks tolerated before an active session ends
pub const DEFAULT_GRACE_TICKS: u32 = 10;

/// One continuous period of a watched app being in the foreground
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub target: AppId,
    pub started_at: DateTime<Utc>,
    pub last_notified_at: DateTime<Utc>,
}

impl Session {
    fn start(target: AppId, now: DateTime<Utc>) -> Self {
        Self {
            target,
            started_at: now,
            last_notified_at: now,
        }
    }

    /// Whole seconds since the session started (zero if the clock went backwards)
    #[must_use]
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        whole_seconds_between(self.started_at, now)
    }

    #[must_use]
    pub fn seconds_since_notified(&self, now: DateTime<Utc>) -> u64 {
        whole_seconds_between(self.last_notified_at, now)
    }

    fn mark_notified(&mut self, now: DateTime<Utc>) {
        // never move backwards, even if the wall clock does
        self.last_notified_at = self.last_notified_at.max(now);
    }
}

fn whole_seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from(to.signed_duration_since(from).num_seconds()).unwrap_or(0)
}

/// Mutable monitoring state, owned by the scheduler and written only by
/// [`SessionTracker::on_tick`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionState {
    session: Option<Session>,
    missed_ticks: u32,
    last_detection: Option<DateTime<Utc>>,
}

impl DetectionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn active_target(&self) -> Option<&AppId> {
        self.session.as_ref().map(|s| &s.target)
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.session.is_none()
    }

    /// Consecutive ticks without a watched detection
    #[must_use]
    pub fn missed_ticks(&self) -> u32 {
        self.missed_ticks
    }

    /// Time of the last tick that resolved to a watched app
    #[must_use]
    pub fn last_detection(&self) -> Option<DateTime<Utc>> {
        self.last_detection
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What the scheduler should do after a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A watched app came to the foreground. `previous` is the session it
    /// replaced, if the user hopped directly from another watched app.
    StartSession {
        target: AppId,
        previous: Option<AppId>,
    },
    /// The same app is still in use and the next warning is due
    SendWarning { target: AppId, elapsed_seconds: u64 },
    /// The active session is over
    EndSession { target: AppId },
    NoAction,
}

impl Action {
    #[must_use]
    pub fn target(&self) -> Option<&AppId> {
        match self {
            Self::StartSession { target, .. }
            | Self::SendWarning { target, .. }
            | Self::EndSession { target } => Some(target),
            Self::NoAction => None,
        }
    }
}

/// Decides session transitions and warning timing
#[derive(Debug, Clone)]
pub struct SessionTracker {
    watch_set: WatchSet,
    policy: IntervalPolicy,
    grace_ticks: u32,
}

impl SessionTracker {
    /// Create a tracker
    ///
    /// `grace_ticks` below 1 is treated as 1: a single inconclusive tick is the
    /// shortest window that can end a session.
    #[must_use]
    pub fn new(watch_set: WatchSet, policy: IntervalPolicy, grace_ticks: u32) -> Self {
        Self {
            watch_set,
            policy,
            grace_ticks: grace_ticks.max(1),
        }
    }

    #[must_use]
    pub fn watch_set(&self) -> &WatchSet {
        &self.watch_set
    }

    #[must_use]
    pub fn policy(&self) -> &IntervalPolicy {
        &self.policy
    }

    #[must_use]
    pub fn grace_ticks(&self) -> u32 {
        self.grace_ticks
    }

    /// Advance the state machine by one tick
    pub fn on_tick(
        &self,
        state: &mut DetectionState,
        detected: Option<&AppId>,
        now: DateTime<Utc>,
    ) -> Action {
        match detected {
            Some(app) if self.watch_set.contains(app) => self.on_watched(state, app, now),
            other => self.on_inconclusive(state, other.is_some()),
        }
    }

    fn on_watched(&self, state: &mut DetectionState, app: &AppId, now: DateTime<Utc>) -> Action {
        state.missed_ticks = 0;
        state.last_detection = Some(now);

        if let Some(session) = state.session.as_mut().filter(|s| s.target == *app) {
            let elapsed_seconds = session.elapsed_seconds(now);
            let interval = self.policy.interval_for(elapsed_seconds);

            if session.seconds_since_notified(now) >= interval {
                session.mark_notified(now);
                return Action::SendWarning {
                    target: app.clone(),
                    elapsed_seconds,
                };
            }
            return Action::NoAction;
        }

        // New session, or a hop between two watched apps: escalation restarts
        let previous = state
            .session
            .replace(Session::start(app.clone(), now))
            .map(|old| old.target);

        Action::StartSession {
            target: app.clone(),
            previous,
        }
    }

    /// `confirmed_other` is true when the classifier saw a non-watched app,
    /// false when it could not resolve anything
    fn on_inconclusive(&self, state: &mut DetectionState, confirmed_other: bool) -> Action {
        state.missed_ticks = state.missed_ticks.saturating_add(1);

        let grace_expired = state.missed_ticks >= self.grace_ticks;
        if confirmed_other || grace_expired {
            if let Some(session) = state.session.take() {
                return Action::EndSession {
                    target: session.target,
                };
            }
        }

        Action::NoAction
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(
            WatchSet::default(),
            IntervalPolicy::default(),
            DEFAULT_GRACE_TICKS,
        )
    }
}

#[cfg(test)]
mod tests;
