//! Retry wrapper around the transcription client.
//!
//! Bounded exponential backoff: attempts = 1 + max_retry, delays of
//! base × 2^(attempt−1) between them, interruptible by the cancel token.
//! Only transport failures and 5xx responses are retried; everything else
//! fails fast.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::logging::{field, FileLogger};
use crate::pipeline::client::{ClientError, TranscribeOptions, TranscriptionResult, WhisperClient};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRY: u32 = 3;

/// Default initial backoff delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Transcription client with retry semantics.
pub struct RetryClient {
    inner: WhisperClient,
    max_retry: u32,
    base_delay: Duration,
    logger: Option<Arc<FileLogger>>,
}

impl RetryClient {
    pub fn new(inner: WhisperClient) -> Self {
        Self {
            inner,
            max_retry: DEFAULT_MAX_RETRY,
            base_delay: DEFAULT_BASE_DELAY,
            logger: None,
        }
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn set_base_delay(&mut self, base_delay: Duration) {
        self.base_delay = base_delay;
    }

    pub fn with_logger(mut self, logger: Arc<FileLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Delay before retry `attempt` (1-indexed): base × 2^(attempt−1).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Transcribe with retries. Returns the first success, or — once every
    /// attempt is spent — an error citing the attempt count and the last
    /// underlying failure.
    pub async fn transcribe(
        &self,
        cancel: CancelToken,
        audio_path: &Path,
        opts: &TranscribeOptions,
    ) -> Result<TranscriptionResult, RetryError> {
        let mut last_err: Option<ClientError> = None;

        for attempt in 0..=self.max_retry {
            if attempt > 0 {
                let delay = self.delay_for_attempt(attempt);
                self.log_retry(attempt, delay, last_err.as_ref());

                let mut cancel = cancel.clone();
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(RetryError::Client(ClientError::Cancelled));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match self.inner.transcribe(cancel.clone(), audio_path, opts).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() => last_err = Some(e),
                Err(e) => return Err(RetryError::Client(e)),
            }
        }

        Err(RetryError::Exhausted {
            retries: self.max_retry,
            source: last_err.expect("at least one attempt was made"),
        })
    }

    fn log_retry(&self, attempt: u32, delay: Duration, err: Option<&ClientError>) {
        if let Some(logger) = &self.logger {
            let cause = err.map(|e| e.to_string()).unwrap_or_default();
            logger.error(
                "transcription failed, retrying",
                Some(&cause),
                &[
                    field("attempt", attempt),
                    field("max_retry", self.max_retry),
                    field("delay_ms", delay.as_millis()),
                ],
            );
        }
    }
}

/// Error from the retry wrapper.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// A non-retryable failure, surfaced as-is.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Every attempt failed with a retryable error.
    #[error("transcription failed after {retries} retries: {source}")]
    Exhausted {
        retries: u32,
        #[source]
        source: ClientError,
    },
}
