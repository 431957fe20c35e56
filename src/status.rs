//! Daily stats parsed back out of the pipeline log.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::logging;

/// Statistics for one log file (one UTC day).
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// Completed pipeline runs.
    pub files_processed: usize,

    /// ERROR lines of any component.
    pub errors: usize,

    /// Most recent completion, if any.
    pub last_processed: Option<ProcessedFile>,
}

/// One completed file as recorded in the log.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFile {
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub output: String,
}

/// Path of today's (UTC) transcribe log.
pub fn today_log_path() -> PathBuf {
    logging::log_path_for(
        &logging::default_log_dir(),
        "transcribe",
        Utc::now().date_naive(),
    )
}

/// Parse today's log. A missing file yields empty stats.
pub fn parse_today_stats() -> std::io::Result<Stats> {
    parse_log_file(&today_log_path())
}

/// Parse a single log file into stats. A missing file yields empty stats.
pub fn parse_log_file(path: &Path) -> std::io::Result<Stats> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Stats::default()),
        Err(e) => return Err(e),
    };

    // 2026-01-22T14:30:00Z INFO  [pipeline] file processing complete path=… output=… elapsed=…
    let completed = Regex::new(
        r#"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z)\s+INFO\s+\[pipeline\]\s+file processing complete\s+path=("[^"]*"|\S+)\s+output=("[^"]*"|\S+)"#,
    )
    .expect("static regex compiles");
    let error_line = Regex::new(r"\sERROR\s").expect("static regex compiles");

    let mut stats = Stats::default();
    for line in content.lines() {
        if let Some(caps) = completed.captures(line) {
            stats.files_processed += 1;
            if let Ok(naive) =
                NaiveDateTime::parse_from_str(&caps[1], "%Y-%m-%dT%H:%M:%SZ")
            {
                stats.last_processed = Some(ProcessedFile {
                    timestamp: naive.and_utc(),
                    path: unquote(&caps[2]).to_string(),
                    output: unquote(&caps[3]).to_string(),
                });
            }
        }

        if error_line.is_match(line) {
            stats.errors += 1;
        }
    }

    Ok(stats)
}

fn unquote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}
