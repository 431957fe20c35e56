//! Transcription service orchestrator.
//!
//! Wires watcher, stabilizer, client, writer and archiver together, spawns
//! one worker task per file event, and shuts down by cancelling in-flight
//! work cooperatively and waiting for every worker to reach a terminal
//! state. A worker failure is logged and contained; it never takes the
//! service down.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinSet;

use crate::cancel::{CancelSource, CancelToken};
use crate::config::Config;
use crate::logging::{field, FileLogger, LogConfig};
use crate::pipeline::watcher::FileEvent;
use crate::pipeline::{
    Archiver, DirWatcher, OutputOptions, OutputWriter, PollStabilizer, RetryClient,
    TranscribeOptions, WhisperClient,
};
use crate::pipeline::metadata;

/// The long-running ingestion service.
pub struct Service {
    config: Config,
    logger: FileLogger,
    stabilizer: PollStabilizer,
    client: RetryClient,
    writer: OutputWriter,
    archiver: Archiver,
}

impl Service {
    /// Build a service with the default log location.
    pub fn new(config: Config) -> Result<Self> {
        let logger = FileLogger::new(LogConfig::default()).context("create logger")?;
        Self::with_logger(config, logger)
    }

    /// Build a service writing to the given logger. Applies config defaults
    /// and validates required fields.
    pub fn with_logger(mut config: Config, logger: FileLogger) -> Result<Self> {
        config.apply_defaults();
        config.validate().context("invalid config")?;

        let stabilizer = PollStabilizer::new(
            Duration::from_millis(config.stabilization_interval_ms),
            config.stabilization_checks,
        );

        let client = RetryClient::new(WhisperClient::new(&config.api_url))
            .with_max_retry(config.retry_count)
            .with_logger(Arc::new(logger.with_component("client")));

        Ok(Self {
            config,
            logger,
            stabilizer,
            client,
            writer: OutputWriter::new(),
            archiver: Archiver::new(),
        })
    }

    /// Shorten the backoff between transcription retries.
    pub fn set_retry_base_delay(&mut self, delay: Duration) {
        self.client.set_base_delay(delay);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).context("register SIGINT handler")?;
        let mut sigterm = signal(SignalKind::terminate()).context("register SIGTERM handler")?;

        let source = CancelSource::new();
        let token = source.token();
        let log = self.logger.with_component("service");

        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => log.info("received signal, shutting down", &[field("signal", "SIGINT")]),
                _ = sigterm.recv() => log.info("received signal, shutting down", &[field("signal", "SIGTERM")]),
            }
            source.cancel();
        });

        self.run_with_cancel(token).await
    }

    /// Run until the given token fires. Used directly by tests and wrapped
    /// with signal handling by [`Service::run`].
    pub async fn run_with_cancel(self: Arc<Self>, cancel: CancelToken) -> Result<()> {
        let log = self.logger.with_component("service");

        log.info(
            "starting transcription service",
            &[
                field("watch_dir", &self.config.watch_dir),
                field("api_url", &self.config.api_url),
                field("output_dir", &self.config.output_dir),
            ],
        );

        let (mut events, handle) = DirWatcher::watch(
            cancel.clone(),
            Path::new(&self.config.watch_dir),
            &self.config.watch_patterns,
        )
        .context("start watcher")?;

        log.info(
            "watching for files",
            &[field("patterns", format!("{:?}", self.config.watch_patterns))],
        );

        let mut workers: JoinSet<()> = JoinSet::new();
        let mut shutdown = cancel.clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log.info("shutdown requested", &[]);
                    break;
                }
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            let svc = Arc::clone(&self);
                            let token = cancel.clone();
                            workers.spawn(async move {
                                svc.process_file(token, event).await;
                            });
                        }
                        None => {
                            log.info("watcher stream closed", &[]);
                            break;
                        }
                    }
                }
                // Reap finished workers so the set stays small.
                Some(_) = workers.join_next(), if !workers.is_empty() => {}
            }
        }

        // Drop the receiver before joining the watcher so a blocked send
        // inside the bridge thread errors out instead of wedging the join.
        drop(events);
        tokio::task::spawn_blocking(move || handle.stop())
            .await
            .ok();

        log.info("waiting for in-flight processing to complete", &[]);
        while workers.join_next().await.is_some() {}

        log.info("transcription service stopped", &[]);
        self.logger.close();
        Ok(())
    }

    /// Run the full pipeline for one detected file. Every failure is
    /// terminal for this file only.
    async fn process_file(&self, cancel: CancelToken, event: FileEvent) {
        let log = self.logger.with_component("pipeline");
        let start = std::time::Instant::now();
        let path_str = event.path.display().to_string();

        log.info(
            "processing file",
            &[field("path", &path_str), field("size", event.size)],
        );

        let max_size = self.config.max_file_size_bytes();
        if event.size > max_size {
            log.error(
                "file too large, skipping",
                None,
                &[
                    field("path", &path_str),
                    field("size", event.size),
                    field("max_size", max_size),
                ],
            );
            return;
        }

        if let Err(e) = self
            .stabilizer
            .wait_for_stable(cancel.clone(), &event.path)
            .await
        {
            log.error("stabilization failed", Some(&e), &[field("path", &path_str)]);
            return;
        }
        log.debug("file stabilized", &[field("path", &path_str)]);

        self.log_audio_metadata(&log, &event.path).await;

        log.info("sending for transcription", &[field("path", &path_str)]);

        let opts = TranscribeOptions {
            language: self.config.language.clone(),
            model: self.config.model.clone(),
        };

        let result = match self.client.transcribe(cancel.clone(), &event.path, &opts).await {
            Ok(result) => result,
            Err(e) => {
                log.error("transcription failed", Some(&e), &[field("path", &path_str)]);
                return;
            }
        };

        let mut fields = vec![field("path", &path_str)];
        if let Some(language) = &result.language {
            fields.push(field("language", language));
        }
        log.info("transcription complete", &fields);

        let output_opts = OutputOptions {
            output_dir: PathBuf::from(&self.config.output_dir),
            template_path: self.config.template_path.as_ref().map(PathBuf::from),
            source_file: event.path.clone(),
            timestamp: Some(event.timestamp),
        };

        let output_path = match self
            .writer
            .write(cancel.clone(), &result.text, &output_opts)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                log.error("failed to write output", Some(&e), &[field("path", &path_str)]);
                return;
            }
        };

        log.info(
            "output written",
            &[
                field("source", &path_str),
                field("output", output_path.display()),
            ],
        );

        if let Err(e) = self
            .archiver
            .archive(cancel, &event.path, Path::new(&self.config.archive_dir))
            .await
        {
            log.error("failed to archive file", Some(&e), &[field("path", &path_str)]);
            return;
        }

        log.info(
            "file processing complete",
            &[
                field("path", &path_str),
                field("output", output_path.display()),
                field("elapsed_ms", start.elapsed().as_millis()),
            ],
        );
    }

    /// Best-effort duration logging for M4A sources. Never fatal.
    async fn log_audio_metadata(&self, log: &FileLogger, path: &Path) {
        if path.extension().map_or(true, |ext| ext != "m4a") {
            return;
        }

        let owned = path.to_path_buf();
        let extracted =
            tokio::task::spawn_blocking(move || metadata::extract_m4a(&owned)).await;

        match extracted {
            Ok(Ok(meta)) => {
                if let Some(duration) = meta.duration {
                    log.info(
                        "audio metadata",
                        &[
                            field("path", path.display()),
                            field("duration_secs", format!("{:.1}", duration.as_secs_f64())),
                        ],
                    );
                }
            }
            Ok(Err(e)) => {
                log.debug(
                    "metadata extraction failed",
                    &[field("path", path.display()), field("error", e)],
                );
            }
            Err(_) => {}
        }
    }
}
