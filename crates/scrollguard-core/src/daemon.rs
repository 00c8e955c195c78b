use crate::{
    classifier::UsageClassifier,
    config::{get_data_dir, MonitorConfig},
    ipc::{bind, serve, DaemonIpcHandler},
    monitor::create_usage_source,
    notifier::create_notifier,
    scheduler::{Scheduler, SchedulerConfig, SchedulerHandle},
};
use anyhow::Result;
use std::{path::PathBuf, sync::Arc};

/// Wires the platform collaborators to a scheduler and exposes it over IPC
pub struct Daemon {
    scheduler: Scheduler,
    handle: SchedulerHandle,
    sock_path: PathBuf,
}

impl Daemon {
    /// Build the daemon for the current platform
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the platform has no
    /// usage source, or the data directory cannot be determined
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        config.validate()?;

        let classifier = UsageClassifier::new(create_usage_source()?, config.watch_set.clone())
            .with_window(config.classifier_window());
        let notifier = create_notifier(config.notifier, config.watch_set.clone());
        let (scheduler, handle) = Scheduler::new(
            SchedulerConfig::from(config),
            config.session_tracker()?,
            Box::new(classifier),
            notifier,
        );

        Ok(Self {
            scheduler,
            handle,
            sock_path: get_data_dir()?.join("scrollguard.sock"),
        })
    }

    #[must_use]
    pub fn with_socket_path(mut self, sock_path: PathBuf) -> Self {
        self.sock_path = sock_path;
        self
    }

    /// Sample until Ctrl-C or an IPC shutdown request
    ///
    /// # Errors
    ///
    /// Returns an error if the control socket cannot be bound
    pub async fn run_with_signals(self) -> Result<()> {
        let Self {
            scheduler,
            handle,
            sock_path,
        } = self;

        if let Some(parent) = sock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = bind(&sock_path)?;
        let ipc_task = tokio::spawn(serve(
            listener,
            Arc::new(DaemonIpcHandler::new(handle.clone())),
        ));

        let signal_task = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::info!("Received Ctrl-C, shutting down...");
                    if let Err(e) = handle.stop().await {
                        log::error!("Failed to stop scheduler: {e}");
                    }
                }
                Err(e) => log::error!("Failed to listen for Ctrl-C: {e}"),
            }
        });

        log::info!(
            "Daemon started with signal handling and IPC at {}",
            sock_path.display()
        );
        scheduler.run().await;

        signal_task.abort();
        ipc_task.abort();
        if let Err(e) = std::fs::remove_file(&sock_path) {
            log::warn!("Failed to remove {}: {e}", sock_path.display());
        }
        log::info!("Daemon shut down gracefully.");
        Ok(())
    }
}
