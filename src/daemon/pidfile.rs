//! PID file management for the daemon lifecycle.
//!
//! The daemon's PID lives at `$HOME/.nota/transcribe.pid` as a decimal PID
//! plus newline. Liveness is decided by a signal-0 probe: ESRCH means the
//! file is stale, EPERM means the process exists but belongs to someone
//! else (still counts as alive).

use std::path::{Path, PathBuf};

use thiserror::Error;

/// PID file name under `$HOME/.nota`.
pub const PID_FILE_NAME: &str = "transcribe.pid";

#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("no PID file found")]
    NotFound,

    #[error("invalid PID in file")]
    Invalid,

    #[error("cannot determine home directory")]
    NoHome,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Liveness as decided by the PID file plus a process probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidStatus {
    /// No PID file.
    NotRunning,

    /// PID file present and the process exists.
    Running(i32),

    /// PID file present but the process is gone.
    Stale(i32),
}

/// Handle to a PID file at a fixed path.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// PID file at the well-known per-user location.
    pub fn default_location() -> Result<Self, PidFileError> {
        let home = dirs::home_dir().ok_or(PidFileError::NoHome)?;
        Ok(Self::at(home.join(".nota").join(PID_FILE_NAME)))
    }

    /// PID file at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `pid`, creating the parent directory (0755) if needed. The
    /// file itself is 0644.
    pub fn write(&self, pid: u32) -> Result<(), PidFileError> {
        use std::io::Write;
        use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

        if let Some(dir) = self.path.parent() {
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(dir)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&self.path)?;
        writeln!(file, "{pid}")?;
        Ok(())
    }

    /// Read the PID. A missing file is [`PidFileError::NotFound`]; a
    /// non-numeric or non-positive body is [`PidFileError::Invalid`].
    pub fn read(&self) -> Result<i32, PidFileError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PidFileError::NotFound);
            }
            Err(e) => return Err(PidFileError::Io(e)),
        };

        let pid: i32 = data.trim().parse().map_err(|_| PidFileError::Invalid)?;
        if pid <= 0 {
            return Err(PidFileError::Invalid);
        }
        Ok(pid)
    }

    /// Delete the PID file. Missing is not an error.
    pub fn remove(&self) -> Result<(), PidFileError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PidFileError::Io(e)),
        }
    }

    /// Classify liveness. Invalid file content surfaces as an error rather
    /// than a status.
    pub fn status(&self) -> Result<PidStatus, PidFileError> {
        let pid = match self.read() {
            Ok(pid) => pid,
            Err(PidFileError::NotFound) => return Ok(PidStatus::NotRunning),
            Err(e) => return Err(e),
        };

        if process_alive(pid) {
            Ok(PidStatus::Running(pid))
        } else {
            Ok(PidStatus::Stale(pid))
        }
    }

    /// Remove the PID file if it is stale. Returns whether a stale file
    /// was cleaned.
    pub fn clean_stale(&self) -> Result<bool, PidFileError> {
        match self.status()? {
            PidStatus::Stale(_) => {
                self.remove()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Probe a process with signal 0. EPERM counts as alive.
pub fn process_alive(pid: i32) -> bool {
    // SAFETY: kill with signal 0 performs only an existence check.
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pid_file(temp: &TempDir) -> PidFile {
        PidFile::at(temp.path().join(".nota").join(PID_FILE_NAME))
    }

    #[test]
    fn write_read_round_trip() {
        let temp = TempDir::new().unwrap();
        let pf = pid_file(&temp);

        pf.write(12345).unwrap();
        assert_eq!(pf.read().unwrap(), 12345);

        let raw = std::fs::read_to_string(pf.path()).unwrap();
        assert_eq!(raw, "12345\n");
    }

    #[test]
    fn missing_file_is_not_running() {
        let temp = TempDir::new().unwrap();
        let pf = pid_file(&temp);

        assert!(matches!(pf.read(), Err(PidFileError::NotFound)));
        assert_eq!(pf.status().unwrap(), PidStatus::NotRunning);
    }

    #[test]
    fn invalid_bodies_are_classified_invalid() {
        let temp = TempDir::new().unwrap();
        let pf = pid_file(&temp);
        std::fs::create_dir_all(pf.path().parent().unwrap()).unwrap();

        for body in ["-1\n", "0\n", "abc\n", ""] {
            std::fs::write(pf.path(), body).unwrap();
            assert!(
                matches!(pf.read(), Err(PidFileError::Invalid)),
                "body {body:?} should be invalid"
            );
        }
    }

    #[test]
    fn own_process_is_alive() {
        assert!(process_alive(std::process::id() as i32));
    }

    #[test]
    fn own_pid_reports_running() {
        let temp = TempDir::new().unwrap();
        let pf = pid_file(&temp);

        pf.write(std::process::id()).unwrap();
        assert_eq!(
            pf.status().unwrap(),
            PidStatus::Running(std::process::id() as i32)
        );
        assert!(!pf.clean_stale().unwrap());
        assert!(pf.path().exists());
    }

    #[test]
    fn dead_pid_reports_stale_and_cleans() {
        let temp = TempDir::new().unwrap();
        let pf = pid_file(&temp);

        // Spawn and reap a short-lived child; its PID is dead afterwards.
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        pf.write(pid).unwrap();
        assert_eq!(pf.status().unwrap(), PidStatus::Stale(pid as i32));

        assert!(pf.clean_stale().unwrap());
        assert!(!pf.path().exists());
        assert_eq!(pf.status().unwrap(), PidStatus::NotRunning);
    }

    #[test]
    fn remove_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let pf = pid_file(&temp);

        pf.write(1).unwrap();
        pf.remove().unwrap();
        pf.remove().unwrap();
    }
}
