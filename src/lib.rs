//! nota - voice-note ingestion for a personal knowledge vault
//!
//! A long-lived daemon watches a directory for incoming audio files,
//! waits for each file to finish writing, transcribes it against a
//! whisper-asr-webservice endpoint, writes the transcription into the
//! vault as a markdown note, and archives the original audio.
//!
//! # Architecture
//!
//! Per-file pipeline, one worker task per detected file:
//!
//! ```text
//! watch → stabilize → transcribe (with retry) → write note → archive
//! ```
//!
//! - `pipeline`: the per-file stages (watcher, stabilizer, client, retry,
//!   writer, archiver, metadata)
//! - `service`: the orchestrator wiring the stages together
//! - `daemon`: detached start, graceful stop, PID file
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run in the foreground
//! nota transcribe start
//!
//! # Run detached, then inspect and stop
//! nota transcribe start --daemon
//! nota transcribe status
//! nota transcribe stop
//! ```

pub mod cancel;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod logging;
pub mod pipeline;
pub mod service;
pub mod status;
pub mod vault;

// Re-export main types at crate root for convenience
pub use cancel::{CancelSource, CancelToken};
pub use config::Config;
pub use pipeline::{
    Archiver, DirWatcher, FileEvent, OutputOptions, OutputWriter, PollStabilizer, RetryClient,
    TranscribeOptions, TranscriptionResult, WhisperClient,
};
pub use service::Service;
