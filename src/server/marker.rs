//! Daemon process marker
//!
//! A PID file records which process is serving. Liveness is checked with
//! `kill(pid, 0)`; a marker whose process is gone is stale and gets replaced.
//! The PID is written to a private file first and hard-linked into place, so
//! the marker never exists without its content.

use crate::error::{MaxlonError, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DaemonMarker {
    path: PathBuf,
}

impl DaemonMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID recorded in the marker, if the file exists and holds one
    pub fn read_pid(&self) -> Option<u32> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        content.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
    }

    /// PID of the live daemon, `None` when there is none (or the marker is stale)
    pub fn is_live(&self) -> Option<u32> {
        self.read_pid().filter(|pid| process_alive(*pid))
    }

    /// Claim the marker for the current process.
    ///
    /// Fails with [`MaxlonError::DaemonAlreadyRunning`] when another live
    /// process holds it; the existing file is left untouched in that case.
    pub fn acquire(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let staged = self.stage_pid()?;
        let claimed = self.link_staged(&staged);
        if let Err(e) = std::fs::remove_file(&staged) {
            debug!("unable to remove {}: {}", staged.display(), e);
        }
        if claimed? {
            info!("daemon marker written to {}", self.path.display());
            return Ok(());
        }

        // lost a race with another starting daemon
        match self.is_live() {
            Some(pid) => Err(MaxlonError::DaemonAlreadyRunning { pid }),
            None => Err(MaxlonError::Io(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("unable to claim {}", self.path.display()),
            ))),
        }
    }

    /// Write our PID to a uniquely named sibling of the marker
    fn stage_pid(&self) -> Result<PathBuf> {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "maxlon.pid".to_string());
        let staged = self.path.with_file_name(format!(
            ".{}.{}.{}",
            name,
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged)?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()?;
        Ok(staged)
    }

    /// Link the staged file into place; `Ok(false)` when a stale marker kept
    /// getting in the way
    fn link_staged(&self, staged: &Path) -> Result<bool> {
        for _ in 0..2 {
            match std::fs::hard_link(staged, &self.path) {
                Ok(()) => return Ok(true),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let recorded = self.read_pid();
                    if let Some(pid) = recorded.filter(|pid| process_alive(*pid)) {
                        return Err(MaxlonError::DaemonAlreadyRunning { pid });
                    }
                    // another starter may have replaced it since we looked
                    if self.read_pid() != recorded {
                        continue;
                    }
                    warn!("removing stale daemon marker {}", self.path.display());
                    match std::fs::remove_file(&self.path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(false)
    }

    /// Remove the marker if it still belongs to this process
    pub fn release(&self) -> Result<()> {
        match self.read_pid() {
            Some(pid) if pid == std::process::id() => {
                std::fs::remove_file(&self.path)?;
                debug!("daemon marker {} removed", self.path.display());
            }
            Some(pid) => {
                warn!(
                    "daemon marker {} belongs to pid {}, leaving it",
                    self.path.display(),
                    pid
                );
            }
            None => {}
        }
        Ok(())
    }

    /// Ask the recorded daemon to stop with SIGTERM; returns its PID
    pub fn signal_stop(&self) -> Result<u32> {
        let pid = self.is_live().ok_or(MaxlonError::DaemonNotRunning)?;
        send_signal(pid, libc::SIGTERM)?;
        info!("sent SIGTERM to daemon pid {}", pid);
        Ok(pid)
    }
}

fn process_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs the permission and existence checks only
    let rc = unsafe { libc::kill(raw, 0) };
    if rc == 0 {
        return true;
    }
    // exists but owned by someone else
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

fn send_signal(pid: u32, signal: libc::c_int) -> Result<()> {
    let raw = libc::pid_t::try_from(pid).map_err(|_| MaxlonError::ProcessSignalFailure {
        pid,
        reason: "pid out of range".to_string(),
    })?;
    // SAFETY: plain syscall on a validated positive pid
    let rc = unsafe { libc::kill(raw, signal) };
    if rc != 0 {
        return Err(MaxlonError::ProcessSignalFailure {
            pid,
            reason: std::io::Error::last_os_error().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // far above any default pid_max
    const DEAD_PID: u32 = 2_000_000_000;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let marker = DaemonMarker::new(dir.path().join("run").join("maxlon.pid"));

        assert!(marker.is_live().is_none());
        marker.acquire().unwrap();
        assert_eq!(marker.read_pid(), Some(std::process::id()));
        assert_eq!(marker.is_live(), Some(std::process::id()));

        marker.release().unwrap();
        assert!(!marker.path().exists());
    }

    #[test]
    fn test_second_acquire_fails() {
        let dir = tempfile::tempdir().unwrap();
        let marker = DaemonMarker::new(dir.path().join("maxlon.pid"));
        marker.acquire().unwrap();

        let err = DaemonMarker::new(marker.path()).acquire().unwrap_err();
        assert!(matches!(
            err,
            MaxlonError::DaemonAlreadyRunning { pid } if pid == std::process::id()
        ));
        // the first holder is untouched
        assert_eq!(marker.read_pid(), Some(std::process::id()));
    }

    #[test]
    fn test_live_foreign_marker_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maxlon.pid");
        let parent = std::os::unix::process::parent_id();
        std::fs::write(&path, format!("{parent}\n")).unwrap();

        let marker = DaemonMarker::new(&path);
        let err = marker.acquire().unwrap_err();
        assert!(matches!(err, MaxlonError::DaemonAlreadyRunning { pid } if pid == parent));

        // not ours, so release leaves it in place
        marker.release().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_stale_marker_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maxlon.pid");
        std::fs::write(&path, format!("{DEAD_PID}\n")).unwrap();

        let marker = DaemonMarker::new(&path);
        assert_eq!(marker.read_pid(), Some(DEAD_PID));
        assert!(marker.is_live().is_none());

        marker.acquire().unwrap();
        assert_eq!(marker.read_pid(), Some(std::process::id()));
    }

    #[test]
    fn test_garbage_marker_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maxlon.pid");
        std::fs::write(&path, "not a pid").unwrap();
        let marker = DaemonMarker::new(&path);
        assert!(marker.read_pid().is_none());
        marker.acquire().unwrap();

        std::fs::write(&path, "0").unwrap();
        assert!(marker.read_pid().is_none());
    }

    #[test]
    fn test_concurrent_acquire_has_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maxlon.pid");
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    DaemonMarker::new(path).acquire()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.into_iter().filter_map(|r| r.err()) {
            assert!(matches!(err, MaxlonError::DaemonAlreadyRunning { .. }));
        }
        assert_eq!(DaemonMarker::new(&path).read_pid(), Some(std::process::id()));

        // staging files are cleaned up
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("maxlon.pid")]);
    }

    #[test]
    fn test_signal_stop_without_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let marker = DaemonMarker::new(dir.path().join("maxlon.pid"));
        assert!(matches!(
            marker.signal_stop().unwrap_err(),
            MaxlonError::DaemonNotRunning
        ));

        std::fs::write(marker.path(), format!("{DEAD_PID}")).unwrap();
        assert!(matches!(
            marker.signal_stop().unwrap_err(),
            MaxlonError::DaemonNotRunning
        ));
    }

    #[test]
    fn test_send_signal_failure() {
        let err = send_signal(DEAD_PID, 0).unwrap_err();
        assert!(matches!(err, MaxlonError::ProcessSignalFailure { pid, .. } if pid == DEAD_PID));
    }
}
