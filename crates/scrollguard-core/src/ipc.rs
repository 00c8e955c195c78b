use crate::scheduler::{SchedulerHandle, StatusSnapshot};
use crate::watch_set::AppId;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
};

/// IPC request from CLI to daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum IpcRequest {
    Status,
    /// Clear detection state, keep sampling
    Restart,
    /// Send an immediate warning for `target` without touching the session
    ForceWarn { target: String },
    Shutdown,
}

/// IPC response from daemon to CLI
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum IpcResponse {
    Status(StatusSnapshot),
    Restarted,
    Warned,
    Shutdown,
    Error(String),
}

#[derive(Debug)]
pub struct IpcClient {
    sock_path: PathBuf,
}

impl IpcClient {
    #[must_use]
    pub fn new(sock_path: &Path) -> Self {
        Self {
            sock_path: sock_path.to_path_buf(),
        }
    }

    /// Send one request and wait for its response
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable or the reply is malformed
    pub async fn send_command(&self, request: IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.sock_path).await?;

        let encoded = bincode::serialize(&request)?;
        stream.write_all(&encoded).await?;
        stream.shutdown().await?;

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        let response: IpcResponse = bincode::deserialize(&buffer)?;

        Ok(response)
    }
}

/// Answers CLI requests by forwarding them to the scheduler
pub struct DaemonIpcHandler {
    scheduler: SchedulerHandle,
}

impl DaemonIpcHandler {
    #[must_use]
    pub fn new(scheduler: SchedulerHandle) -> Self {
        Self { scheduler }
    }

    /// Map a request to the scheduler command it stands for
    pub async fn respond(&self, request: IpcRequest) -> IpcResponse {
        let result = match request {
            IpcRequest::Status => self.scheduler.status().await.map(IpcResponse::Status),
            IpcRequest::Restart => self
                .scheduler
                .restart()
                .await
                .map(|()| IpcResponse::Restarted),
            IpcRequest::ForceWarn { target } => self
                .scheduler
                .force_warn(AppId::new(target))
                .await
                .map(|()| IpcResponse::Warned),
            IpcRequest::Shutdown => self
                .scheduler
                .stop()
                .await
                .map(|()| IpcResponse::Shutdown),
        };
        result.unwrap_or_else(|e| IpcResponse::Error(format!("{e:#}")))
    }

    /// # Errors
    ///
    /// Returns an error if the response cannot be encoded or written
    pub async fn handle(&self, stream: &mut UnixStream, request: IpcRequest) -> Result<()> {
        let response = self.respond(request).await;
        let encoded = bincode::serialize(&response)?;
        stream.write_all(&encoded).await?;
        Ok(())
    }
}

/// Bind the control socket, replacing a stale one left by a crashed daemon
///
/// # Errors
///
/// Returns an error if the stale socket cannot be removed or binding fails
pub fn bind(sock_path: &Path) -> io::Result<UnixListener> {
    if sock_path.exists() {
        fs::remove_file(sock_path)?;
    }
    UnixListener::bind(sock_path)
}

/// Accept connections forever, one request per connection
pub async fn serve(listener: UnixListener, handler: Arc<DaemonIpcHandler>) {
    loop {
        match listener.accept().await {
            Ok((mut stream, _)) => {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    match stream.read_to_end(&mut buf).await {
                        Ok(n) if n > 0 => match bincode::deserialize::<IpcRequest>(&buf) {
                            Ok(request) => {
                                log::debug!("IPC request: {request:?}");
                                if let Err(e) = handler.handle(&mut stream, request).await {
                                    log::error!("IPC handle error: {e}");
                                }
                            }
                            Err(e) => {
                                log::error!("IPC deserialize error: {e}");
                            }
                        },
                        Ok(_) => {} // Connection closed
                        Err(e) => {
                            log::error!("IPC read error: {e}");
                        }
                    }
                });
            }
            Err(e) => {
                log::error!("IPC accept error: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ForegroundClassifier;
    use crate::notifier::{create_notifier, NotifierKind};
    use crate::scheduler::{Scheduler, SchedulerConfig};
    use crate::session_tracker::SessionTracker;
    use crate::watch_set::WatchSet;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct NothingInFront;

    #[async_trait]
    impl ForegroundClassifier for NothingInFront {
        async fn resolve_foreground_app(&self, _window_end: DateTime<Utc>) -> Option<AppId> {
            None
        }
    }

    #[tokio::test]
    async fn test_round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("scrollguard.sock");

        let (scheduler, handle) = Scheduler::new(
            SchedulerConfig::default(),
            SessionTracker::default(),
            Box::new(NothingInFront),
            create_notifier(NotifierKind::Log, WatchSet::default()),
        );
        let scheduler_task = tokio::spawn(scheduler.run());

        let listener = bind(&sock_path).unwrap();
        tokio::spawn(serve(listener, Arc::new(DaemonIpcHandler::new(handle))));
        let client = IpcClient::new(&sock_path);

        match client.send_command(IpcRequest::Status).await.unwrap() {
            IpcResponse::Status(status) => {
                assert!(status.running);
                assert_eq!(status.active_target, None);
            }
            other => panic!("unexpected response: {other:?}"),
        }

        let warned = client
            .send_command(IpcRequest::ForceWarn {
                target: String::from("com.instagram.android"),
            })
            .await
            .unwrap();
        assert_eq!(warned, IpcResponse::Warned);

        let restarted = client.send_command(IpcRequest::Restart).await.unwrap();
        assert_eq!(restarted, IpcResponse::Restarted);

        let shutdown = client.send_command(IpcRequest::Shutdown).await.unwrap();
        assert_eq!(shutdown, IpcResponse::Shutdown);
        scheduler_task.await.unwrap();

        // scheduler is gone; the handler reports rather than hangs
        match client.send_command(IpcRequest::Status).await.unwrap() {
            IpcResponse::Error(message) => assert!(message.contains("not running")),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("stale.sock");
        fs::write(&sock_path, b"").unwrap();

        let listener = bind(&sock_path);
        assert!(listener.is_ok());
    }

    #[tokio::test]
    async fn test_client_fails_without_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let client = IpcClient::new(&dir.path().join("missing.sock"));
        assert!(client.send_command(IpcRequest::Status).await.is_err());
    }
}
