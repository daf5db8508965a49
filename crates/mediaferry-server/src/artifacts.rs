//! Files created while serving one request.
//!
//! Every path registered here is removed when the session ends, whatever
//! the outcome of the request. Removal failures are logged and swallowed;
//! they never change a response that was already sent.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// The transient artifact set of one connection.
#[derive(Debug, Default)]
pub struct TransientArtifacts {
    paths: Vec<PathBuf>,
}

impl TransientArtifacts {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` for removal and returns it.
    ///
    /// Register before creating the file, so a failure halfway through a
    /// write still leaves nothing behind.
    pub fn register(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.paths.push(path.clone());
        path
    }

    /// Number of registered paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns true if nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Removes every registered path and empties the set.
    ///
    /// Returns the number of files actually deleted.
    pub async fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        for path in self.paths.drain(..) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed transient file");
                    removed += 1;
                }
                Err(e) => log_failure(&path, &e),
            }
        }
        removed
    }
}

impl Drop for TransientArtifacts {
    fn drop(&mut self) {
        // Only reached when the session future was dropped before cleanup ran.
        for path in self.paths.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                log_failure(&path, &e);
            }
        }
    }
}

fn log_failure(path: &Path, error: &io::Error) {
    // A file that was registered but never created is not a failure.
    if error.kind() != io::ErrorKind::NotFound {
        warn!(path = %path.display(), error = %error, "Failed to remove transient file");
    }
}
