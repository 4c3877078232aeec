//! Optional per-path exclusivity for concurrent connections.
//!
//! Without leases, two live connections for the same transfer identity
//! both append to the same file and the result is undefined. With leases
//! enabled, the second handshake is refused until the first connection
//! ends.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Table of destination paths currently claimed by a connection.
#[derive(Debug, Clone, Default)]
pub struct PathLeases {
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `path`, or returns `None` if another connection holds it.
    pub fn try_acquire(&self, path: &Path) -> Option<PathLease> {
        let mut held = lock(&self.held);
        if !held.insert(path.to_path_buf()) {
            return None;
        }
        Some(PathLease {
            path: path.to_path_buf(),
            held: Arc::clone(&self.held),
        })
    }

    /// Returns `true` if `path` is currently claimed.
    pub fn is_held(&self, path: &Path) -> bool {
        lock(&self.held).contains(path)
    }
}

/// A claim on one destination path, released on drop.
#[derive(Debug)]
pub struct PathLease {
    path: PathBuf,
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathLease {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathLease {
    fn drop(&mut self) {
        lock(&self.held).remove(&self.path);
    }
}

// A panic while holding the lock cannot leave the set half-updated.
fn lock(held: &Mutex<HashSet<PathBuf>>) -> MutexGuard<'_, HashSet<PathBuf>> {
    held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
