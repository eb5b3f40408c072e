//! Derives the on-disk locations of the bundled server and its artefacts.
//!
//! The server script, its log file and the port lease all live in the
//! install directory, so the supervisor and any diagnostics agree on where
//! to look without re-deriving the layout.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;

/// Canonical paths for the bundled server and the files written beside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPaths {
    install_dir: PathBuf,
    script_path: PathBuf,
    log_path: PathBuf,
    lock_path: PathBuf,
}

impl ServerPaths {
    /// Derives server paths from the shared configuration.
    ///
    /// When no install directory is configured, the directory containing the
    /// running executable is used. The paths are not checked for existence.
    pub fn from_config(config: &Config) -> Result<Self, ServerPathsError> {
        let install_dir = match config.install_dir.as_ref() {
            Some(dir) => dir.as_std_path().to_path_buf(),
            None => executable_directory()?,
        };
        Ok(Self::in_directory(install_dir, config))
    }

    fn in_directory(install_dir: PathBuf, config: &Config) -> Self {
        Self {
            script_path: install_dir.join(&config.server_script),
            log_path: install_dir.join(&config.log_file),
            lock_path: install_dir.join(format!("server-{}.lock", config.port)),
            install_dir,
        }
    }

    /// Directory holding the server artefact; used as the working directory.
    pub fn install_dir(&self) -> &Path {
        self.install_dir.as_path()
    }

    /// Path to the bundled server script.
    pub fn script_path(&self) -> &Path {
        self.script_path.as_path()
    }

    /// Path to the append-only server log.
    pub fn log_path(&self) -> &Path {
        self.log_path.as_path()
    }

    /// Path to the lock file leasing the configured port.
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }
}

fn executable_directory() -> Result<PathBuf, ServerPathsError> {
    let executable = env::current_exe().map_err(|source| ServerPathsError::CurrentExe { source })?;
    executable
        .parent()
        .map(Path::to_path_buf)
        .ok_or(ServerPathsError::MissingParent { path: executable })
}

/// Errors raised while deriving server paths.
#[derive(Debug, Error)]
pub enum ServerPathsError {
    /// The running executable could not be located.
    #[error("failed to locate the running executable: {source}")]
    CurrentExe {
        #[source]
        source: std::io::Error,
    },
    /// The executable path lacked a parent directory.
    #[error("executable path {path:?} has no parent directory")]
    MissingParent { path: PathBuf },
}
