/// Daemon lifecycle management commands
use anyhow::Result;
use chrono::Local;
use scrollguard_core::{
    config::{default_config_path, MonitorConfig},
    daemon_control::DaemonControl,
    ipc::{IpcClient, IpcRequest, IpcResponse},
    Daemon, StatusSnapshot,
};
use std::{env, fs, path::Path, process::Command, time::Duration};
use sysinfo::{Pid, System};

const SOCKET_NAME: &str = "scrollguard.sock";
const PID_NAME: &str = "scrollguard.pid";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn is_alive(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_process(Pid::from_u32(pid))
}

pub fn start_daemon(data_dir: &Path) -> Result<()> {
    let control = DaemonControl::with_pid_file(data_dir.join(PID_NAME));
    let sock_path = data_dir.join(SOCKET_NAME);

    // 1. Check if daemon is already running
    match control.get_pid() {
        Ok(Some(pid)) if is_alive(pid) => {
            log::info!("Daemon is already running (PID: {pid}).");
            return Ok(());
        }
        Ok(None) => {}
        _ => {
            log::warn!("Removing stale PID file.");
            control.remove_pid()?;
        }
    }

    // 2. Clean up old socket if it exists
    if sock_path.exists() {
        log::warn!("Removing stale socket file.");
        fs::remove_file(&sock_path)?;
    }

    // Fail here, not in the detached process, on a broken config
    MonitorConfig::load(&default_config_path()?)?;

    log::info!("Starting scrollguard daemon...");

    // 3. Spawn a new process for the daemon
    let child = Command::new(env::current_exe()?)
        .arg("daemon-internal-start")
        .current_dir(env::current_dir()?)
        .spawn()?;

    // 4. In parent process, write PID and exit
    log::info!("Daemon process started with PID: {}", child.id());
    control.write_pid(child.id())
}

pub async fn run_daemon_process(data_dir: &Path) -> Result<()> {
    // Detached process: nothing is attached to stderr any more
    setup_daemon_logging(data_dir)?;
    log::info!("Daemon process started internally.");

    if let Err(e) = daemon_main_logic().await {
        log::error!("Daemon main logic exited with a fatal error: {e:#}");
        return Err(e);
    }

    let control = DaemonControl::with_pid_file(data_dir.join(PID_NAME));
    if matches!(control.get_pid(), Ok(Some(pid)) if pid == std::process::id()) {
        control.remove_pid()?;
    }
    Ok(())
}

async fn daemon_main_logic() -> Result<()> {
    let config = MonitorConfig::load(&default_config_path()?)?;
    Daemon::new(&config)?.run_with_signals().await
}

pub async fn stop_daemon(data_dir: &Path) -> Result<()> {
    let control = DaemonControl::with_pid_file(data_dir.join(PID_NAME));
    let sock_path = data_dir.join(SOCKET_NAME);

    let Some(pid) = control.get_pid()? else {
        log::info!("Daemon is not running (no PID file).");
        // Also remove socket if it exists for consistency
        if sock_path.exists() {
            fs::remove_file(&sock_path)?;
        }
        return Ok(());
    };

    log::info!("Stopping scrollguard daemon (PID: {pid})...");
    let client = IpcClient::new(&sock_path);

    match client.send_command(IpcRequest::Shutdown).await {
        Ok(IpcResponse::Shutdown) => {
            log::info!("Daemon shutdown signal sent. Waiting for process to exit...");
            tokio::time::sleep(SHUTDOWN_GRACE).await;
            if is_alive(pid) {
                log::warn!("Daemon did not stop gracefully. Force killing...");
                kill(pid);
            } else {
                log::info!("Daemon stopped successfully.");
            }
        }
        Ok(resp) => log::error!("Received unexpected response from daemon: {resp:?}"),
        Err(e) => {
            log::error!("Failed to send shutdown command: {e}. Forcing cleanup.");
            kill(pid);
        }
    }

    // Cleanup
    control.remove_pid()?;
    if sock_path.exists() {
        fs::remove_file(&sock_path)?;
    }

    Ok(())
}

fn kill(pid: u32) {
    let mut sys = System::new();
    let pid = Pid::from_u32(pid);
    if sys.refresh_process(pid) {
        if let Some(process) = sys.process(pid) {
            process.kill();
            log::info!("Process killed.");
        }
    }
}

pub async fn show_status(data_dir: &Path, json: bool) -> Result<()> {
    let sock_path = data_dir.join(SOCKET_NAME);

    let status = if sock_path.exists() {
        match IpcClient::new(&sock_path)
            .send_command(IpcRequest::Status)
            .await
        {
            Ok(IpcResponse::Status(status)) => status,
            Ok(IpcResponse::Error(e)) => anyhow::bail!("Daemon reported an error: {e}"),
            Ok(_) => anyhow::bail!("Unexpected response from daemon"),
            Err(e) => {
                log::error!("Failed to get status: {e}");
                StatusSnapshot::stopped()
            }
        }
    } else {
        StatusSnapshot::stopped()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in render_status(&status) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn restart_daemon(data_dir: &Path) -> Result<()> {
    match send(data_dir, IpcRequest::Restart).await? {
        IpcResponse::Restarted => {
            println!("Detection state cleared; monitoring continues.");
            Ok(())
        }
        other => unexpected(other),
    }
}

pub async fn force_warn(data_dir: &Path, app_id: String) -> Result<()> {
    let target = app_id.clone();
    match send(data_dir, IpcRequest::ForceWarn { target }).await? {
        IpcResponse::Warned => {
            println!("Warning sent for {app_id}.");
            Ok(())
        }
        other => unexpected(other),
    }
}

async fn send(data_dir: &Path, request: IpcRequest) -> Result<IpcResponse> {
    let sock_path = data_dir.join(SOCKET_NAME);
    if !sock_path.exists() {
        anyhow::bail!("Daemon is not running. Start it with `scrollguard start`.");
    }
    IpcClient::new(&sock_path).send_command(request).await
}

fn unexpected(response: IpcResponse) -> Result<()> {
    match response {
        IpcResponse::Error(e) => anyhow::bail!("Daemon reported an error: {e}"),
        other => anyhow::bail!("Unexpected response from daemon: {other:?}"),
    }
}

fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

fn render_status(status: &StatusSnapshot) -> Vec<String> {
    if !status.running {
        return vec![String::from("Daemon Status: Not running")];
    }

    let mut lines = vec![String::from("Daemon Status: Running")];
    match (&status.active_target, &status.active_name) {
        (Some(target), Some(name)) => {
            lines.push(format!("\nActive app: {name} ({target})"));
            lines.push(format!(
                "Session Duration: {}",
                format_duration(status.session_seconds)
            ));
        }
        (Some(target), None) => lines.push(format!("\nActive app: {target}")),
        _ => lines.push(String::from("\nActive app: None")),
    }
    if status.missed_ticks > 0 {
        lines.push(format!("Missed ticks: {}", status.missed_ticks));
    }
    lines.push(format!(
        "Last detection: {}",
        status.last_detection.map_or_else(
            || String::from("never"),
            |t| t.with_timezone(&Local).format("%H:%M:%S").to_string()
        )
    ));
    lines.push(format!(
        "\nTicks: {} (faults: {})",
        status.ticks, status.faults
    ));
    lines
}

fn setup_daemon_logging(data_dir: &Path) -> Result<()> {
    use std::fs::{create_dir_all, OpenOptions};

    create_dir_all(data_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join("scrollguard.log"))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .format_timestamp_secs()
        .init();

    Ok(())
}
