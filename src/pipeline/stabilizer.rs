//! File write-completion detection.
//!
//! No portable signal marks the end of a sync agent's write, so the
//! stabilizer polls the file size and declares the file stable once it has
//! held constant for a configured number of consecutive samples.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::cancel::CancelToken;

#[derive(Debug, Error)]
pub enum StabilizeError {
    #[error("source file missing: {0}")]
    SourceMissing(PathBuf),

    #[error("stabilization timeout: file did not stabilize in time")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Polling-based stabilizer.
#[derive(Debug, Clone)]
pub struct PollStabilizer {
    /// Duration between size samples.
    pub interval: Duration,

    /// Consecutive unchanged samples required.
    pub checks: u32,

    /// Optional cap on total wait. `None` relies on cancellation alone.
    pub timeout: Option<Duration>,
}

impl PollStabilizer {
    pub fn new(interval: Duration, checks: u32) -> Self {
        Self {
            interval,
            checks,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Block until the size of `path` is unchanged for `checks` consecutive
    /// samples. The first sample never counts as stable: the baseline
    /// starts unseen.
    pub async fn wait_for_stable(
        &self,
        mut cancel: CancelToken,
        path: &Path,
    ) -> Result<(), StabilizeError> {
        let deadline = self.timeout.map(|t| Instant::now() + t);

        let mut last_size: Option<u64> = None;
        let mut stable_count = 0u32;

        while stable_count < self.checks {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(StabilizeError::Timeout);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(StabilizeError::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }

            let size = match tokio::fs::metadata(path).await {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StabilizeError::SourceMissing(path.to_path_buf()));
                }
                Err(e) => return Err(StabilizeError::Io(e)),
            };

            if last_size == Some(size) {
                stable_count += 1;
            } else {
                stable_count = 0;
                last_size = Some(size);
            }
        }

        Ok(())
    }
}
