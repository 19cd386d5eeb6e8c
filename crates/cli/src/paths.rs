//! Path resolution for ReviewDock data files.
//!
//! Resolved once at startup from: CLI `--data-dir` > `REVIEWDOCK_DATA_DIR` env > `~/.reviewdock`.
//! clap already folds the env var into the flag, so callers pass the flag value.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;

const DEFAULT_DIR_NAME: &str = ".reviewdock";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Priority: `explicit` > `~/.reviewdock`.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => dirs::home_dir()
                .context("HOME directory not found; pass --data-dir")?
                .join(DEFAULT_DIR_NAME),
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create all required subdirectories under the data dir.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();
        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.config_path(), tmp.path().join("config.toml"));
    }

    #[test]
    fn ensure_dirs_creates_log_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path().join("nested").as_path())).unwrap();
        dir.ensure_dirs().unwrap();
        assert!(dir.log_dir().is_dir());
    }
}
