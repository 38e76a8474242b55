//! Guard against overlapping runs.
//!
//! Within the daemon a mutex serialises runs. The lock marker file extends
//! this to other processes sharing the same state file: a marker younger than
//! the configured age blocks the run, an older one is treated as left over
//! from a crashed run and taken over.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::MutexGuard;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::LockConfig;

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("another run is in progress")]
    Busy,

    #[error("lock file '{}' is {}s old; another run is in progress", path.display(), age.as_secs())]
    Locked { path: PathBuf, age: Duration },

    #[error("failed to write lock file '{0}': {1}")]
    Io(PathBuf, #[source] std::io::Error),
}

#[derive(Debug)]
struct Marker {
    path: PathBuf,
    stale_after: Duration,
}

#[derive(Debug)]
pub struct RunGate {
    running: Mutex<()>,
    marker: Option<Marker>,
}

/// Held for the duration of a run. Removes the lock marker when dropped.
#[derive(Debug)]
pub struct RunGuard<'a> {
    _running: MutexGuard<'a, ()>,
    marker: Option<&'a Path>,
}

impl RunGate {
    pub fn new(config: &LockConfig) -> Self {
        let marker = config.enabled.then(|| Marker {
            path: config.path.clone(),
            stale_after: Duration::from_secs(config.stale_after_secs),
        });

        Self {
            running: Mutex::new(()),
            marker,
        }
    }

    /// Start a run, failing immediately if another one is active.
    pub fn try_acquire(&self) -> Result<RunGuard<'_>, GateError> {
        let running = self.running.try_lock().map_err(|_| GateError::Busy)?;

        let Some(marker) = &self.marker else {
            return Ok(RunGuard {
                _running: running,
                marker: None,
            });
        };

        if let Some(age) = marker_age(&marker.path) {
            if age <= marker.stale_after {
                return Err(GateError::Locked {
                    path: marker.path.clone(),
                    age,
                });
            }
            info!(
                "Lock file is older than {} seconds, continuing",
                marker.stale_after.as_secs()
            );
        }

        // Rewriting the marker also refreshes its age when taking over a stale one
        std::fs::write(&marker.path, b"").map_err(|e| GateError::Io(marker.path.clone(), e))?;
        debug!("Lock file {} created", marker.path.display());

        Ok(RunGuard {
            _running: running,
            marker: Some(&marker.path),
        })
    }

    /// Wait for any active run to finish. Does not touch the lock marker.
    pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.running.lock().await
    }
}

/// Age of the marker, or `None` if there is none.
fn marker_age(path: &Path) -> Option<Duration> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    // A timestamp in the future counts as brand new
    Some(modified.elapsed().unwrap_or_default())
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(path) = self.marker {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Lock file {} deleted", path.display()),
                Err(e) => warn!("Failed to delete lock file {}: {}", path.display(), e),
            }
        }
    }
}
