//! Server Lifecycle
//!
//! Single-live-instance discipline: an exclusive-create lock file (stale
//! after 30 s) plus a PID file describing the running server. Both live in
//! the data directory and are removed on graceful shutdown.

use std::path::{Path, PathBuf};
use std::time::Duration;

use oracle_core::{OracleError, Result};
use serde_json::json;
use tracing::{info, warn};

/// A lock older than this belongs to a dead server.
pub const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// Exclusive instance lock. Released on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock, treating an existing lock older than
    /// [`LOCK_STALE_AFTER`] as stale. A live lock fails fast.
    pub fn acquire(path: &Path) -> Result<Self> {
        Self::acquire_with_stale(path, LOCK_STALE_AFTER)
    }

    pub fn acquire_with_stale(path: &Path, stale_after: Duration) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        match Self::try_create(path) {
            Ok(()) => Ok(Self { path: path.to_path_buf() }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let age = std::fs::metadata(path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| t.elapsed().ok());
                match age {
                    Some(age) if age > stale_after => {
                        warn!("oracle: removing stale lock at {:?} (age {:?})", path, age);
                        std::fs::remove_file(path)?;
                        Self::try_create(path).map_err(|e| {
                            OracleError::Init(format!("lock contention at {:?}: {}", path, e))
                        })?;
                        Ok(Self { path: path.to_path_buf() })
                    }
                    _ => Err(OracleError::Init(format!(
                        "another instance holds the lock at {:?}",
                        path
                    ))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn try_create(path: &Path) -> std::io::Result<()> {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        write!(file, "{}", std::process::id())?;
        Ok(())
    }

    pub fn release(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("oracle: failed to remove lock {:?}: {}", self.path, e);
            }
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// PID file describing the running HTTP server.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn write(path: &Path, port: u16) -> Result<Self> {
        let payload = json!({
            "pid": std::process::id(),
            "port": port,
            "startedAt": chrono::Utc::now().to_rfc3339(),
            "name": "oracle-http",
        });
        std::fs::write(path, serde_json::to_string_pretty(&payload).unwrap_or_default())?;
        Ok(Self { path: path.to_path_buf() })
    }

    pub fn remove(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("oracle: failed to remove pid file {:?}: {}", self.path, e);
            }
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Resolves when SIGINT or SIGTERM arrives.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("oracle: ctrl_c handler failed: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => warn!("oracle: SIGTERM handler failed: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_fast() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("oracle-http.lock");

        let _lock = InstanceLock::acquire(&path).unwrap();
        let err = InstanceLock::acquire(&path).unwrap_err();
        assert!(matches!(err, OracleError::Init(_)));
    }

    #[test]
    fn test_release_allows_reacquire() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("oracle-http.lock");

        {
            let _lock = InstanceLock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        // Dropped: no zombie lock
        assert!(!path.exists());
        let _lock = InstanceLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("oracle-http.lock");
        std::fs::write(&path, "12345").unwrap();

        // With a zero staleness window the leftover file counts as dead
        let lock = InstanceLock::acquire_with_stale(&path, Duration::ZERO).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, std::process::id().to_string());
        drop(lock);
    }

    #[test]
    fn test_pid_file_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("oracle-http.pid");

        let pid_file = PidFile::write(&path, 47778).unwrap();
        let payload: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(payload["pid"], std::process::id());
        assert_eq!(payload["port"], 47778);
        assert_eq!(payload["name"], "oracle-http");

        drop(pid_file);
        assert!(!path.exists());
    }
}
