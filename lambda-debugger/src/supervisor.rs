//! Background daemon management
//!
//! The daemon is this same executable running `serve`, detached into its own
//! process group. A small JSON pid file records which process it is.

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::client::DaemonClient;
use crate::config::DaemonConfig;

const PID_FILE: &str = ".lambda-debugger.pid.json";
const OUT_LOG: &str = ".lambda-debugger.out.log";
const ERR_LOG: &str = ".lambda-debugger.err.log";

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Lambda Debugger daemon is already running (PID: {0})")]
    AlreadyRunning(i32),

    #[error("Lambda Debugger daemon is not running")]
    NotRunning,

    #[error("Failed to start daemon: {0}")]
    StartFailed(String),

    #[error("Failed to stop daemon: {0}")]
    StopFailed(String),

    #[error("Could not determine home directory")]
    NoHomeDir,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt pid file: {0}")]
    PidFile(#[from] serde_json::Error),
}

/// Contents of the pid file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PidRecord {
    pub pid: i32,
    pub port: u16,
    pub started_at: DateTime<Utc>,
}

impl PidRecord {
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

#[derive(Debug, PartialEq)]
pub enum DaemonStatus {
    Running(PidRecord),
    Stopped,
}

/// Locations of the files the supervisor owns
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub pid_file: PathBuf,
    pub out_log: PathBuf,
    pub err_log: PathBuf,
}

impl DaemonPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            pid_file: dir.join(PID_FILE),
            out_log: dir.join(OUT_LOG),
            err_log: dir.join(ERR_LOG),
        }
    }
}

pub struct Supervisor {
    paths: DaemonPaths,
    startup_timeout: Duration,
}

impl Supervisor {
    pub fn new(state_dir: &Path, startup_timeout: Duration) -> Self {
        Self {
            paths: DaemonPaths::in_dir(state_dir),
            startup_timeout,
        }
    }

    /// Supervisor rooted at the configured state dir, or the home directory
    pub fn from_config(config: &DaemonConfig) -> Result<Self, SupervisorError> {
        let state_dir = match &config.state_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir().ok_or(SupervisorError::NoHomeDir)?,
        };
        Ok(Self::new(
            &state_dir,
            Duration::from_millis(config.startup_timeout_ms),
        ))
    }

    pub fn paths(&self) -> &DaemonPaths {
        &self.paths
    }

    /// Current daemon state; a pid file naming a dead process is removed
    pub fn status(&self) -> Result<DaemonStatus, SupervisorError> {
        let Some(record) = self.read_pid_file()? else {
            return Ok(DaemonStatus::Stopped);
        };

        if is_alive(record.pid) {
            Ok(DaemonStatus::Running(record))
        } else {
            debug!(pid = record.pid, "Removing stale pid file");
            self.remove_pid_file()?;
            Ok(DaemonStatus::Stopped)
        }
    }

    /// Spawn `<current exe> serve --port <port> <serve_args>` in the background
    /// and wait for it to answer `/health`
    pub async fn start(
        &self,
        port: u16,
        serve_args: &[OsString],
    ) -> Result<PidRecord, SupervisorError> {
        if let DaemonStatus::Running(record) = self.status()? {
            return Err(SupervisorError::AlreadyRunning(record.pid));
        }

        let exe = std::env::current_exe()?;
        let stdout = open_log(&self.paths.out_log)?;
        let stderr = open_log(&self.paths.err_log)?;

        let mut child = Command::new(exe)
            .arg("serve")
            .arg("--port")
            .arg(port.to_string())
            .args(serve_args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0)
            .spawn()
            .map_err(|e| SupervisorError::StartFailed(format!("spawn failed: {e}")))?;

        let pid = i32::try_from(child.id()).map_err(|_| {
            SupervisorError::StartFailed(format!("pid {} out of range", child.id()))
        })?;
        let record = PidRecord {
            pid,
            port,
            started_at: Utc::now(),
        };
        self.write_pid_file(&record)?;
        info!(pid, port, "Daemon spawned, waiting for it to become ready");

        let client = DaemonClient::local(port)
            .map_err(|e| SupervisorError::StartFailed(e.to_string()))?;
        let deadline = Instant::now() + self.startup_timeout;
        let mut attempt = 0u32;

        loop {
            sleep(POLL_INTERVAL).await;
            attempt += 1;

            if let Some(exit) = child.try_wait()? {
                self.remove_pid_file()?;
                return Err(SupervisorError::StartFailed(format!(
                    "daemon exited with {exit}; see {}",
                    self.paths.err_log.display()
                )));
            }

            if matches!(client.health(POLL_INTERVAL * 5).await, Ok(true)) {
                info!(pid, port, "Daemon ready");
                return Ok(record);
            }

            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                self.remove_pid_file()?;
                return Err(SupervisorError::StartFailed(format!(
                    "daemon did not become healthy within {}ms",
                    self.startup_timeout.as_millis()
                )));
            }

            if attempt % 10 == 0 {
                warn!(attempt, "Still waiting for daemon to start");
            }
        }
    }

    /// SIGTERM the daemon, escalating to SIGKILL after a grace period
    pub async fn stop(&self) -> Result<PidRecord, SupervisorError> {
        let DaemonStatus::Running(record) = self.status()? else {
            return Err(SupervisorError::NotRunning);
        };
        let pid = Pid::from_raw(record.pid);

        match kill(pid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => return Err(SupervisorError::StopFailed(format!("SIGTERM: {e}"))),
        }

        let deadline = Instant::now() + STOP_GRACE;
        while is_alive(record.pid) && Instant::now() < deadline {
            sleep(POLL_INTERVAL).await;
        }

        if is_alive(record.pid) {
            warn!(pid = record.pid, "Daemon ignored SIGTERM, sending SIGKILL");
            match kill(pid, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => return Err(SupervisorError::StopFailed(format!("SIGKILL: {e}"))),
            }
        }

        self.remove_pid_file()?;
        info!(pid = record.pid, "Daemon stopped");
        Ok(record)
    }

    /// Stop (if running) and start again
    pub async fn restart(
        &self,
        port: u16,
        serve_args: &[OsString],
    ) -> Result<PidRecord, SupervisorError> {
        match self.stop().await {
            Ok(_) | Err(SupervisorError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.start(port, serve_args).await
    }

    fn read_pid_file(&self) -> Result<Option<PidRecord>, SupervisorError> {
        match fs::read_to_string(&self.paths.pid_file) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_pid_file(&self, record: &PidRecord) -> Result<(), SupervisorError> {
        fs::write(&self.paths.pid_file, serde_json::to_vec_pretty(record)?)?;
        Ok(())
    }

    fn remove_pid_file(&self) -> Result<(), SupervisorError> {
        match fs::remove_file(&self.paths.pid_file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Signal 0 probe; EPERM still means the process exists
fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}

fn open_log(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Last `lines` lines of a log file; a missing file reads as empty
pub fn tail_log(path: &Path, lines: usize) -> std::io::Result<Vec<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut tail = std::collections::VecDeque::with_capacity(lines);
    for line in BufReader::new(file).lines() {
        if tail.len() == lines {
            tail.pop_front();
        }
        if lines > 0 {
            tail.push_back(line?);
        }
    }
    Ok(tail.into())
}

/// `1h 2m 3s` style rendering for status output
pub fn format_uptime(uptime: chrono::Duration) -> String {
    let total = uptime.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
