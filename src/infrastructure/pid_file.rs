//! PID File
//!
//! Writes the process id on startup and removes the file when dropped.

use std::io;
use std::path::{Path, PathBuf};

/// RAII guard for a PID file.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path`, replacing any stale file.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::write(&path, format!("{}\n", std::process::id()))?;
        tracing::debug!("wrote pid file {}", path.display());
        Ok(Self { path })
    }

    /// Location of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("cannot remove pid file {}: {}", self.path.display(), e);
        }
    }
}
