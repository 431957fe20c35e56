//! Source relocation after successful transcription.
//!
//! Rename into the archive tree when possible; on cross-device moves fall
//! back to copy, flush, then delete. The source is never removed before
//! the destination copy is durable.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cancel::CancelToken;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Moves processed audio into the archive directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct Archiver;

impl Archiver {
    pub fn new() -> Self {
        Self
    }

    /// Relocate `source_path` to `archive_dir/<basename>`, creating the
    /// archive directory if needed.
    pub async fn archive(
        &self,
        cancel: CancelToken,
        source_path: &Path,
        archive_dir: &Path,
    ) -> Result<PathBuf, ArchiveError> {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }

        let meta = match tokio::fs::metadata(source_path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::SourceNotFound(source_path.to_path_buf()));
            }
            Err(e) => return Err(ArchiveError::Io(e)),
        };

        create_dir_0755(archive_dir).await?;

        let file_name = source_path
            .file_name()
            .ok_or_else(|| ArchiveError::SourceNotFound(source_path.to_path_buf()))?;
        let dest_path = archive_dir.join(file_name);

        match tokio::fs::rename(source_path, &dest_path).await {
            Ok(()) => Ok(dest_path),
            Err(_) => {
                // Cross-device (or otherwise un-renameable): copy then delete.
                copy_and_delete(source_path, &dest_path, meta.permissions()).await?;
                Ok(dest_path)
            }
        }
    }
}

/// Copy `src` to `dst` preserving the file mode, fsync the copy, then
/// remove `src`.
async fn copy_and_delete(
    src: &Path,
    dst: &Path,
    permissions: std::fs::Permissions,
) -> Result<(), ArchiveError> {
    let data = tokio::fs::read(src).await?;

    let file = tokio::fs::File::create(dst).await?;
    file.set_permissions(permissions).await?;
    {
        use tokio::io::AsyncWriteExt;
        let mut file = file;
        file.write_all(&data).await?;
        file.sync_all().await?;
    }

    tokio::fs::remove_file(src).await?;
    Ok(())
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
