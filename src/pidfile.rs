//! Daemon pid file, status probe and stop signal

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default pid file location
pub fn pid_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::state_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("dropsortd.pid")
}

/// Whether the daemon is running according to the pid file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Running { pid: u32 },
    /// The pid file names a process that no longer exists
    Stale { pid: u32 },
    NotRunning,
}

/// Read the pid recorded at `path`
pub fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Check the daemon recorded at `path`
pub fn status(path: &Path) -> DaemonStatus {
    match read_pid(path) {
        Some(pid) if is_alive(pid) => DaemonStatus::Running { pid },
        Some(pid) => DaemonStatus::Stale { pid },
        None => DaemonStatus::NotRunning,
    }
}

#[cfg(unix)]
fn is_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn is_alive(_pid: u32) -> bool {
    false
}

/// Ask the daemon recorded at `path` to shut down
#[cfg(unix)]
pub fn terminate(path: &Path) -> Result<u32> {
    let pid = match status(path) {
        DaemonStatus::Running { pid } => pid,
        _ => anyhow::bail!("Daemon is not running"),
    };
    let raw = libc::pid_t::try_from(pid).context("Pid out of range")?;
    if unsafe { libc::kill(raw, libc::SIGTERM) } != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("Failed to signal pid {}", pid));
    }
    Ok(pid)
}

#[cfg(not(unix))]
pub fn terminate(_path: &Path) -> Result<u32> {
    anyhow::bail!("Stopping the daemon is only supported on Unix platforms")
}

/// Pid file owned by the running daemon, removed on drop
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Record this process at `path`, refusing if another daemon is alive
    pub fn create(path: &Path) -> Result<Self> {
        if let DaemonStatus::Running { pid } = status(path)
            && pid != std::process::id()
        {
            anyhow::bail!("Daemon already running with pid {}", pid);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, std::process::id().to_string())
            .with_context(|| format!("Failed to write pid file {}", path.display()))?;
        debug!("Wrote pid file {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove pid file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropsortd.pid");
        assert_eq!(status(&path), DaemonStatus::NotRunning);

        {
            let pid_file = PidFile::create(&path).unwrap();
            assert_eq!(read_pid(pid_file.path()), Some(std::process::id()));
            #[cfg(unix)]
            assert_eq!(
                status(&path),
                DaemonStatus::Running {
                    pid: std::process::id()
                }
            );
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_garbage_pid_file_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropsortd.pid");
        std::fs::write(&path, "not a pid").unwrap();

        assert_eq!(status(&path), DaemonStatus::NotRunning);
    }
}
