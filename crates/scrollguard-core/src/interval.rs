//! Warning cadence as a function of how long a session has been running.
//!
//! The longer a session lasts, the shorter the gap before the next warning.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum seconds between warnings for the default escalation table
#[must_use]
pub const fn next_interval_seconds(elapsed_secs: u64) -> u64 {
    match elapsed_secs {
        0..=59 => 60,    // first minute
        60..=119 => 30,  // second minute
        120..=179 => 15, // third minute
        180..=299 => 10, // up to 5 minutes
        300..=599 => 5,  // up to 10 minutes
        _ => 2,
    }
}

/// One breakpoint: from `from_secs` of elapsed session time onward, warn
/// every `interval_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalStep {
    pub from_secs: u64,
    pub interval_secs: u64,
}

impl IntervalStep {
    #[must_use]
    pub const fn new(from_secs: u64, interval_secs: u64) -> Self {
        Self {
            from_secs,
            interval_secs,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalTableError {
    #[error("interval table is empty")]
    Empty,
    #[error("interval table must start at 0 seconds, found {0}")]
    MissingZeroBreakpoint(u64),
    #[error("breakpoint {current} does not follow {previous}; breakpoints must strictly increase")]
    UnorderedBreakpoint { previous: u64, current: u64 },
    #[error("interval at {from_secs}s grows to {interval_secs}s; intervals must not increase")]
    IncreasingInterval { from_secs: u64, interval_secs: u64 },
    #[error("interval at {0}s is zero")]
    ZeroInterval(u64),
}

/// Validated step table mapping elapsed session seconds to a warning interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalPolicy {
    steps: Vec<IntervalStep>,
}

impl IntervalPolicy {
    /// Build a policy from a breakpoint table
    ///
    /// # Errors
    ///
    /// Returns an error unless the table starts at 0, has strictly increasing
    /// breakpoints and non-increasing, non-zero intervals
    pub fn new(steps: Vec<IntervalStep>) -> Result<Self, IntervalTableError> {
        let first = steps.first().ok_or(IntervalTableError::Empty)?;
        if first.from_secs != 0 {
            return Err(IntervalTableError::MissingZeroBreakpoint(first.from_secs));
        }

        for step in &steps {
            if step.interval_secs == 0 {
                return Err(IntervalTableError::ZeroInterval(step.from_secs));
            }
        }

        for pair in steps.windows(2) {
            let (previous, current) = (pair[0], pair[1]);
            if current.from_secs <= previous.from_secs {
                return Err(IntervalTableError::UnorderedBreakpoint {
                    previous: previous.from_secs,
                    current: current.from_secs,
                });
            }
            if current.interval_secs > previous.interval_secs {
                return Err(IntervalTableError::IncreasingInterval {
                    from_secs: current.from_secs,
                    interval_secs: current.interval_secs,
                });
            }
        }

        Ok(Self { steps })
    }

    /// The default six-step table
    #[must_use]
    pub fn default_steps() -> Vec<IntervalStep> {
        vec![
            IntervalStep::new(0, 60),
            IntervalStep::new(60, 30),
            IntervalStep::new(120, 15),
            IntervalStep::new(180, 10),
            IntervalStep::new(300, 5),
            IntervalStep::new(600, 2),
        ]
    }

    /// Interval in effect after `elapsed_secs` of continuous use
    #[must_use]
    pub fn interval_for(&self, elapsed_secs: u64) -> u64 {
        self.steps
            .iter()
            .rev()
            .find(|step| elapsed_secs >= step.from_secs)
            .map_or(self.steps[0].interval_secs, |step| step.interval_secs)
    }
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self {
            steps: Self::default_steps(),
        }
    }
}
