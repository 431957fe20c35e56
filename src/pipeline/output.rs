//! Output artifact writer.
//!
//! Materializes one markdown note per transcription under the configured
//! output directory, with collision-safe naming.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::cancel::CancelToken;

/// Highest collision suffix probed before giving up.
const MAX_COLLISION_SUFFIX: u32 = 1000;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output directory is required")]
    OutputDirRequired,

    #[error("too many collisions for {0}")]
    TooManyCollisions(String),

    #[error("read template: {0}")]
    Template(std::io::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writer input.
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    /// Target directory, created (0755, recursive) if absent.
    pub output_dir: PathBuf,

    /// Optional template file prepended to the transcription.
    pub template_path: Option<PathBuf>,

    /// Source audio path, used for the `**Source:**` header line.
    pub source_file: PathBuf,

    /// Timestamp used for naming; `None` means now.
    pub timestamp: Option<DateTime<Local>>,
}

/// Markdown output writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputWriter;

impl OutputWriter {
    pub fn new() -> Self {
        Self
    }

    /// Write the transcription and return the path of the created file.
    pub async fn write(
        &self,
        cancel: CancelToken,
        text: &str,
        opts: &OutputOptions,
    ) -> Result<PathBuf, OutputError> {
        if cancel.is_cancelled() {
            return Err(OutputError::Cancelled);
        }

        if opts.output_dir.as_os_str().is_empty() {
            return Err(OutputError::OutputDirRequired);
        }

        create_dir_0755(&opts.output_dir).await?;

        let timestamp = opts.timestamp.unwrap_or_else(Local::now);

        let content = match &opts.template_path {
            Some(template) => from_template(template, text).await?,
            None => plain_markdown(text, &opts.source_file, timestamp),
        };

        write_collision_free(&opts.output_dir, timestamp, content.into_bytes()).await
    }
}

async fn create_dir_0755(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&dir)
    })
    .await
    .expect("dir creation task panicked")
}

/// Write `YYYY-MM-DD-HHmm-voice-note.md`, trying `-2`, `-3`, … on
/// collision. Files are opened with `O_EXCL` so two concurrent writers can
/// never share a path.
async fn write_collision_free(
    output_dir: &Path,
    timestamp: DateTime<Local>,
    content: Vec<u8>,
) -> Result<PathBuf, OutputError> {
    let base = format!("{}-voice-note", timestamp.format("%Y-%m-%d-%H%M"));

    let output_dir = output_dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        for i in 1..=MAX_COLLISION_SUFFIX {
            let name = if i == 1 {
                format!("{base}.md")
            } else {
                format!("{base}-{i}.md")
            };
            let path = output_dir.join(name);

            match open_exclusive_0644(&path) {
                Ok(mut file) => {
                    use std::io::Write;
                    file.write_all(&content)?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(OutputError::Io(e)),
            }
        }

        Err(OutputError::TooManyCollisions(base))
    })
    .await
    .expect("file write task panicked")
}

fn open_exclusive_0644(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)
}

/// Template content plus the transcription, separated by one blank line.
async fn from_template(template: &Path, text: &str) -> Result<String, OutputError> {
    let template_content = tokio::fs::read_to_string(template)
        .await
        .map_err(OutputError::Template)?;

    let mut content = template_content;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push('\n');
    content.push_str(text);
    content.push('\n');
    Ok(content)
}

/// Structured markdown when no template is configured.
fn plain_markdown(text: &str, source_file: &Path, timestamp: DateTime<Local>) -> String {
    let mut content = String::new();
    content.push_str("# Voice Note\n\n");
    content.push_str(&format!(
        "**Date:** {}\n\n",
        timestamp.format("%Y-%m-%d %H:%M")
    ));

    if let Some(name) = source_file.file_name() {
        content.push_str(&format!("**Source:** {}\n\n", name.to_string_lossy()));
    }

    content.push_str("## Transcription\n\n");
    content.push_str(text);
    content.push('\n');
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelSource;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 22, 14, 30, 0).unwrap()
    }

    fn opts(dir: &Path) -> OutputOptions {
        OutputOptions {
            output_dir: dir.to_path_buf(),
            template_path: None,
            source_file: PathBuf::from("/w/meeting.m4a"),
            timestamp: Some(fixed_timestamp()),
        }
    }

    #[tokio::test]
    async fn filename_follows_timestamp_format() {
        let temp = TempDir::new().unwrap();
        let writer = OutputWriter::new();
        let source = CancelSource::new();

        let path = writer
            .write(source.token(), "hello", &opts(temp.path()))
            .await
            .unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "2026-01-22-1430-voice-note.md"
        );
    }

    #[tokio::test]
    async fn collisions_get_numeric_suffixes() {
        let temp = TempDir::new().unwrap();
        let writer = OutputWriter::new();
        let source = CancelSource::new();

        let first = writer
            .write(source.token(), "one", &opts(temp.path()))
            .await
            .unwrap();
        let second = writer
            .write(source.token(), "two", &opts(temp.path()))
            .await
            .unwrap();
        let third = writer
            .write(source.token(), "three", &opts(temp.path()))
            .await
            .unwrap();

        assert!(first.to_string_lossy().ends_with("voice-note.md"));
        assert!(second.to_string_lossy().ends_with("voice-note-2.md"));
        assert!(third.to_string_lossy().ends_with("voice-note-3.md"));

        assert!(std::fs::read_to_string(&second).unwrap().contains("two"));
        assert!(std::fs::read_to_string(&third).unwrap().contains("three"));
    }

    #[tokio::test]
    async fn collision_cap_is_enforced() {
        let temp = TempDir::new().unwrap();

        std::fs::write(temp.path().join("2026-01-22-1430-voice-note.md"), b"").unwrap();
        for i in 2..=MAX_COLLISION_SUFFIX {
            std::fs::write(
                temp.path().join(format!("2026-01-22-1430-voice-note-{i}.md")),
                b"",
            )
            .unwrap();
        }

        let writer = OutputWriter::new();
        let source = CancelSource::new();
        let err = writer
            .write(source.token(), "overflow", &opts(temp.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, OutputError::TooManyCollisions(_)));
    }

    #[tokio::test]
    async fn concurrent_writers_never_share_a_path() {
        let temp = TempDir::new().unwrap();
        let source = CancelSource::new();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let o = opts(temp.path());
            let token = source.token();
            tasks.push(tokio::spawn(async move {
                OutputWriter::new()
                    .write(token, &format!("note {i}"), &o)
                    .await
                    .unwrap()
            }));
        }

        let mut paths = Vec::new();
        for task in tasks {
            paths.push(task.await.unwrap());
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8, "every writer must get a distinct path");
    }

    #[tokio::test]
    async fn plain_markdown_has_structured_header() {
        let temp = TempDir::new().unwrap();
        let writer = OutputWriter::new();
        let source = CancelSource::new();

        let path = writer
            .write(source.token(), "the transcription", &opts(temp.path()))
            .await
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();

        assert!(content.starts_with("# Voice Note\n\n"));
        assert!(content.contains("**Date:** 2026-01-22 14:30\n\n"));
        assert!(content.contains("**Source:** meeting.m4a\n\n"));
        assert!(content.contains("## Transcription\n\nthe transcription\n"));
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn source_line_omitted_when_empty() {
        let temp = TempDir::new().unwrap();
        let writer = OutputWriter::new();
        let source = CancelSource::new();

        let mut o = opts(temp.path());
        o.source_file = PathBuf::new();

        let path = writer.write(source.token(), "text", &o).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("**Source:**"));
    }

    #[tokio::test]
    async fn template_gets_one_blank_line_before_text() {
        let temp = TempDir::new().unwrap();
        let writer = OutputWriter::new();
        let source = CancelSource::new();

        // Template without trailing newline.
        let template = temp.path().join("template.md");
        std::fs::write(&template, b"---\ntags: voice\n---").unwrap();

        let mut o = opts(temp.path());
        o.template_path = Some(template);

        let path = writer.write(source.token(), "body", &o).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "---\ntags: voice\n---\n\nbody\n");
    }

    #[tokio::test]
    async fn template_with_trailing_newline_not_doubled() {
        let temp = TempDir::new().unwrap();
        let writer = OutputWriter::new();
        let source = CancelSource::new();

        let template = temp.path().join("template.md");
        std::fs::write(&template, b"# Head\n").unwrap();

        let mut o = opts(temp.path());
        o.template_path = Some(template);

        let path = writer.write(source.token(), "body", &o).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "# Head\n\nbody\n");
    }

    #[tokio::test]
    async fn unreadable_template_is_surfaced() {
        let temp = TempDir::new().unwrap();
        let writer = OutputWriter::new();
        let source = CancelSource::new();

        let mut o = opts(temp.path());
        o.template_path = Some(temp.path().join("missing.md"));

        let err = writer.write(source.token(), "body", &o).await.unwrap_err();
        assert!(matches!(err, OutputError::Template(_)));
    }

    #[tokio::test]
    async fn missing_output_dir_parameter_is_rejected() {
        let writer = OutputWriter::new();
        let source = CancelSource::new();

        let o = OutputOptions::default();
        let err = writer.write(source.token(), "body", &o).await.unwrap_err();
        assert!(matches!(err, OutputError::OutputDirRequired));
    }

    #[tokio::test]
    async fn output_directory_is_created() {
        let temp = TempDir::new().unwrap();
        let writer = OutputWriter::new();
        let source = CancelSource::new();

        let nested = temp.path().join("inbox/voice");
        let mut o = opts(temp.path());
        o.output_dir = nested.clone();

        let path = writer.write(source.token(), "body", &o).await.unwrap();
        assert!(nested.is_dir());
        assert!(path.starts_with(&nested));
    }

    #[tokio::test]
    async fn cancelled_on_entry() {
        let temp = TempDir::new().unwrap();
        let writer = OutputWriter::new();
        let source = CancelSource::new();
        source.cancel();

        let err = writer
            .write(source.token(), "body", &opts(temp.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, OutputError::Cancelled));
    }
}
