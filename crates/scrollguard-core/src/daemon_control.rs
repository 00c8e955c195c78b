use anyhow::{Context, Result};
use std::path::PathBuf;

/// PID file bookkeeping for the background daemon
#[derive(Debug, Clone)]
pub struct DaemonControl {
    pid_file: PathBuf,
}

impl DaemonControl {
    #[must_use]
    pub fn with_pid_file(pid_file: PathBuf) -> Self {
        Self { pid_file }
    }

    /// Record `pid` as the running daemon
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn write_pid(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.pid_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.pid_file, pid.to_string())
            .with_context(|| format!("failed to write {}", self.pid_file.display()))
    }

    /// Get PID of running daemon
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but does not hold a PID
    pub fn get_pid(&self) -> Result<Option<u32>> {
        if !self.pid_file.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.pid_file)?;
        let pid = contents
            .trim()
            .parse::<u32>()
            .with_context(|| format!("corrupt PID file {}", self.pid_file.display()))?;
        Ok(Some(pid))
    }

    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed
    pub fn remove_pid(&self) -> Result<()> {
        if self.pid_file.exists() {
            std::fs::remove_file(&self.pid_file)?;
        }
        Ok(())
    }
}
