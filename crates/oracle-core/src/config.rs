//! Configuration
//!
//! Environment-driven configuration resolved once at startup. The
//! recognized variables are the exhaustive set: `ORACLE_PORT`,
//! `ORACLE_DATA_DIR`, `ORACLE_DB_PATH`, `ORACLE_REPO_ROOT`,
//! `ORACLE_VECTOR_CMD`, plus `HOME`/`USERPROFILE` for the default data dir.

use std::path::{Path, PathBuf};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 47778;

/// Name of the knowledge root marker directory
pub const PSI_DIR: &str = "ψ";

/// Default vector backend child command
pub const DEFAULT_VECTOR_CMD: &str = "oracle-embedd";

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP port
    pub port: u16,
    /// Store + lock + pid files live here
    pub data_dir: PathBuf,
    /// SQLite database path
    pub db_path: PathBuf,
    /// Knowledge root: contains `ψ/memory/{resonance,learnings,retrospectives}`
    pub repo_root: PathBuf,
    /// Vector backend child process command
    pub vector_cmd: String,
    /// Vector collection name
    pub collection: String,
}

impl Config {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let data_dir = std::env::var("ORACLE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".oracle-v2"));

        let db_path = std::env::var("ORACLE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("oracle.db"));

        let repo_root = std::env::var("ORACLE_REPO_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| discover_repo_root().unwrap_or_else(|| data_dir.clone()));

        let port = std::env::var("ORACLE_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let vector_cmd = std::env::var("ORACLE_VECTOR_CMD")
            .unwrap_or_else(|_| DEFAULT_VECTOR_CMD.to_string());

        Self {
            port,
            data_dir,
            db_path,
            repo_root,
            vector_cmd,
            collection: "oracle_knowledge".to_string(),
        }
    }

    /// Root of the markdown corpus: `<repo_root>/ψ/memory`
    pub fn memory_root(&self) -> PathBuf {
        self.repo_root.join(PSI_DIR).join("memory")
    }

    /// Directory learn writes new patterns into
    pub fn learnings_dir(&self) -> PathBuf {
        self.memory_root().join("learnings")
    }

    /// PID file path
    pub fn pid_file(&self) -> PathBuf {
        self.data_dir.join("oracle-http.pid")
    }

    /// Instance lock path
    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join("oracle-http.lock")
    }
}

/// Walk up from the running binary looking for a `ψ/` directory.
fn discover_repo_root() -> Option<PathBuf> {
    let start = std::env::current_exe().ok()?;
    find_psi_ancestor(start.parent()?)
}

/// Walk up from `start` until an ancestor contains `ψ/`.
pub fn find_psi_ancestor(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        if d.join(PSI_DIR).is_dir() {
            return Some(d.to_path_buf());
        }
        dir = d.parent();
    }
    None
}
