//! The per-file ingestion pipeline: detect, stabilize, transcribe, write,
//! archive.

pub mod archive;
pub mod client;
pub mod metadata;
pub mod output;
pub mod retry;
pub mod stabilizer;
pub mod watcher;

pub use archive::{ArchiveError, Archiver};
pub use client::{
    ClientError, OutputFormat, TranscribeOptions, TranscriptionResult, WhisperClient,
};
pub use output::{OutputError, OutputOptions, OutputWriter};
pub use retry::{RetryClient, RetryError};
pub use stabilizer::{PollStabilizer, StabilizeError};
pub use watcher::{DirWatcher, FileEvent, WatchHandle, WatcherError};
