pub mod classifier;
pub mod config;
pub mod daemon;
pub mod daemon_control;
pub mod interval;
pub mod ipc;
pub mod monitor;
pub mod notifier;
pub mod scheduler;
pub mod session_tracker;
pub mod watch_set;

pub use classifier::{ForegroundClassifier, UsageClassifier};
pub use config::{ConfigError, MonitorConfig};
pub use daemon::Daemon;
pub use interval::{next_interval_seconds, IntervalPolicy};
pub use notifier::{EscalationNotifier, EscalationTier};
pub use scheduler::{Scheduler, SchedulerHandle, StatusSnapshot, TickError};
pub use session_tracker::{Action, DetectionState, SessionTracker};
pub use watch_set::{AppId, WatchSet};
