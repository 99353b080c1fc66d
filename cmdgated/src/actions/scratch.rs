// ABOUTME: materializes disposable scratch directories that approved commands run inside.
// ABOUTME: stages declared files before execution and removes the whole tree afterwards.

use std::path::{Component, Path, PathBuf};

use cmdgate_common::CommandFile;
use tracing::{debug, warn};

const SCRATCH_PREFIX: &str = "cmdgate-";

#[derive(Debug, thiserror::Error)]
pub enum ScratchError {
    #[error("create scratch dir failed: {0}")]
    Create(#[source] std::io::Error),
    #[error("file path {0:?} must be relative and stay inside the scratch dir")]
    PathEscapes(String),
    #[error("write {path} failed: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("remove scratch dir failed: {0}")]
    Remove(#[source] std::io::Error),
}

/// Hands out uniquely named scratch environments under an optional root.
#[derive(Debug, Clone, Default)]
pub struct ScratchManager {
    root: Option<PathBuf>,
}

impl ScratchManager {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    pub fn acquire(&self) -> Result<ScratchEnvironment, ScratchError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match &self.root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(ScratchError::Create)?;
        debug!(scratch = %dir.path().display(), "acquired scratch environment");
        Ok(ScratchEnvironment { dir: Some(dir) })
    }
}

/// One command's private directory.
///
/// Dropping the environment removes the directory too, so a panic or an early return
/// between `acquire` and `release` still cleans up.
#[derive(Debug)]
pub struct ScratchEnvironment {
    dir: Option<tempfile::TempDir>,
}

impl ScratchEnvironment {
    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }

    /// Writes every declared file, creating parent directories as needed.
    ///
    /// Entries with an empty path or no content are skipped.
    pub async fn write(&self, files: &[CommandFile]) -> Result<(), ScratchError> {
        for file in files {
            let content = match &file.file_content {
                Some(c) if !file.file_path.is_empty() => c,
                _ => continue,
            };

            let full_path = self.resolve(&file.file_path)?;
            if let Some(parent) = full_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| ScratchError::Write {
                        path: file.file_path.clone(),
                        source,
                    })?;
            }
            tokio::fs::write(&full_path, content.as_bytes())
                .await
                .map_err(|source| ScratchError::Write {
                    path: file.file_path.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    pub fn release(mut self) -> Result<(), ScratchError> {
        match self.dir.take() {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                dir.close().map_err(ScratchError::Remove)?;
                debug!(scratch = %path.display(), "released scratch environment");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, ScratchError> {
        let rel = Path::new(relative);
        let confined = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            return Err(ScratchError::PathEscapes(relative.to_string()));
        }
        Ok(self.path().join(rel))
    }
}

impl Drop for ScratchEnvironment {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(err) = dir.close() {
                warn!(scratch = %path.display(), error = %err, "scratch cleanup on drop failed");
            }
        }
    }
}
