//! Per-job working directory.
//!
//! Removed recursively when dropped, unless the job asked to retain it for
//! inspection; then [`WorkDir::release`] hands the path back to the caller.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

const PREFIX: &str = "fb2c-";

#[derive(Debug)]
pub struct WorkDir {
    dir: Option<TempDir>,
    path: PathBuf,
    retain: bool,
}

impl WorkDir {
    /// Create a uniquely named directory under `parent` (system temp dir when `None`).
    pub fn create(parent: Option<&Path>, retain: bool) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match parent {
            Some(p) => builder.tempdir_in(p)?,
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        tracing::debug!("Working directory {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
            retain,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join<P: AsRef<Path>>(&self, rel: P) -> PathBuf {
        self.path.join(rel)
    }

    /// End the scope. Returns the directory path when it was retained.
    pub fn release(mut self) -> Option<PathBuf> {
        let dir = self.dir.take()?;
        if self.retain {
            Some(keep(dir))
        } else {
            if let Err(e) = dir.close() {
                tracing::warn!("Unable to remove working directory {}: {}", self.path.display(), e);
            }
            None
        }
    }
}

fn keep(dir: TempDir) -> PathBuf {
    let kept = dir.keep();
    tracing::info!("Keeping working directory {}", kept.display());
    kept
}

// Jobs that fail before `release` still honor `retain`.
impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if self.retain {
                keep(dir);
            }
        }
    }
}
