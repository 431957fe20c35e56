//! Structured file logging with daily rotation.
//!
//! Log lines follow a fixed shape the status reporter parses back:
//!
//! ```text
//! 2026-01-22T14:30:00Z INFO  [pipeline] file processing complete path=/w/a.m4a output=/o/note.md
//! ```
//!
//! One file per UTC calendar day (`transcribe-YYYY-MM-DD.log`), rotated on
//! write, pruned past the retention window at startup. A single mutex
//! serializes all writers; component-scoped clones share the same file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, SecondsFormat, Utc};

/// Log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Error => "ERROR",
        }
    }
}

/// A key-value pair attached to a log line.
#[derive(Debug, Clone)]
pub struct Field {
    pub key: &'static str,
    pub value: String,
}

impl Field {
    pub fn new(key: &'static str, value: impl ToString) -> Self {
        Self {
            key,
            value: value.to_string(),
        }
    }
}

/// Convenience constructor for string-ish fields.
pub fn field(key: &'static str, value: impl ToString) -> Field {
    Field::new(key, value)
}

/// Logger configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory holding the log files (default `~/.nota/logs`).
    pub log_dir: PathBuf,
    /// File prefix; `transcribe` produces `transcribe-YYYY-MM-DD.log`.
    pub prefix: String,
    /// Days of log files to retain (default 30).
    pub retention_days: i64,
    /// Minimum level written to disk.
    pub min_level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            prefix: "transcribe".to_string(),
            retention_days: 30,
            min_level: Level::Info,
        }
    }
}

/// Default log directory, `$HOME/.nota/logs`.
pub fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nota")
        .join("logs")
}

/// Path of the log file for a given UTC date.
pub fn log_path_for(log_dir: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    log_dir.join(format!("{}-{}.log", prefix, date.format("%Y-%m-%d")))
}

struct Inner {
    file: Option<File>,
    current_date: Option<NaiveDate>,
}

/// Daily-rotating file logger. Cheap to clone; clones share the file and
/// differ only in the component tag.
#[derive(Clone)]
pub struct FileLogger {
    config: Arc<LogConfig>,
    component: String,
    inner: Arc<Mutex<Inner>>,
}

impl FileLogger {
    /// Open the logger, creating the log directory, rotating to today's
    /// file and pruning logs past the retention window.
    pub fn new(config: LogConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.log_dir)?;

        let logger = Self {
            config: Arc::new(config),
            component: String::new(),
            inner: Arc::new(Mutex::new(Inner {
                file: None,
                current_date: None,
            })),
        };

        {
            let mut inner = logger.inner.lock().expect("logger lock poisoned");
            logger.rotate_if_needed(&mut inner)?;
        }

        if let Err(e) = logger.clean_old_logs() {
            logger.error("failed to clean old logs", Some(&e), &[]);
        }

        Ok(logger)
    }

    /// A clone of this logger tagged with a component name.
    pub fn with_component(&self, component: &str) -> FileLogger {
        FileLogger {
            config: Arc::clone(&self.config),
            component: component.to_string(),
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn info(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Info, msg, None, fields);
    }

    pub fn error(&self, msg: &str, err: Option<&dyn std::fmt::Display>, fields: &[Field]) {
        self.log(Level::Error, msg, err, fields);
    }

    pub fn debug(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Debug, msg, None, fields);
    }

    /// Path of the file lines are currently written to.
    pub fn log_path(&self) -> PathBuf {
        log_path_for(
            &self.config.log_dir,
            &self.config.prefix,
            Utc::now().date_naive(),
        )
    }

    /// Flush and drop the underlying file handle.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("logger lock poisoned");
        if let Some(file) = inner.file.take() {
            drop(file);
        }
        inner.current_date = None;
    }

    fn log(&self, level: Level, msg: &str, err: Option<&dyn std::fmt::Display>, fields: &[Field]) {
        if level < self.config.min_level {
            return;
        }

        let mut inner = self.inner.lock().expect("logger lock poisoned");
        if let Err(e) = self.rotate_if_needed(&mut inner) {
            eprintln!("log rotation failed: {}", e);
            return;
        }

        let line = format_line(level, &self.component, msg, err, fields);
        if let Some(file) = inner.file.as_mut() {
            let _ = file.write_all(line.as_bytes());
        }
    }

    fn rotate_if_needed(&self, inner: &mut Inner) -> std::io::Result<()> {
        let today = Utc::now().date_naive();
        if inner.current_date == Some(today) && inner.file.is_some() {
            return Ok(());
        }

        inner.file = None;

        let path = log_path_for(&self.config.log_dir, &self.config.prefix, today);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        inner.file = Some(file);
        inner.current_date = Some(today);
        Ok(())
    }

    fn clean_old_logs(&self) -> std::io::Result<()> {
        let prefix = format!("{}-", self.config.prefix);
        let cutoff = Utc::now().date_naive() - chrono::Duration::days(self.config.retention_days);

        let mut to_delete = Vec::new();
        for entry in std::fs::read_dir(&self.config.log_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(date_part) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".log"))
            else {
                continue;
            };

            let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
                continue;
            };

            if date < cutoff {
                to_delete.push(entry.path());
            }
        }

        to_delete.sort();
        for path in to_delete {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

fn format_line(
    level: Level,
    component: &str,
    msg: &str,
    err: Option<&dyn std::fmt::Display>,
    fields: &[Field],
) -> String {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut line = String::with_capacity(128);
    line.push_str(&timestamp);
    line.push(' ');
    line.push_str(&format!("{:<5}", level.as_str()));
    line.push(' ');

    if !component.is_empty() {
        line.push('[');
        line.push_str(component);
        line.push_str("] ");
    }

    line.push_str(msg);

    if let Some(err) = err {
        line.push_str(" error=");
        line.push_str(&quote_if_needed(&err.to_string()));
    }

    for f in fields {
        line.push(' ');
        line.push_str(f.key);
        line.push('=');
        line.push_str(&quote_if_needed(&f.value));
    }

    line.push('\n');
    line
}

/// Double-quote values containing whitespace so the line stays parseable.
fn quote_if_needed(value: &str) -> String {
    if value.chars().any(|c| c.is_whitespace()) {
        format!("{:?}", value)
    } else {
        value.to_string()
    }
}
