//! Error types for server process supervision.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while starting or stopping the bundled server.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("bundled server not found at {path:?}; the installation looks incomplete")]
    NotInstalled { path: PathBuf },
    #[error("failed to resolve server paths: {0}")]
    Paths(#[from] lit_config::ServerPathsError),
    #[error("failed to open server log {path:?}: {source}")]
    OpenLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to launch '{program:?}': {source}")]
    LaunchFailed {
        program: OsString,
        #[source]
        source: io::Error,
    },
    #[error("failed to terminate server pid {pid}: {source}")]
    TerminationFailed {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to close server log {path:?}: {source}")]
    LogCloseFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to monitor server process: {source}")]
    MonitorChild {
        #[source]
        source: io::Error,
    },
    #[error("port lease is held by live process {pid}")]
    LeaseHeld { pid: u32 },
    #[error("failed to create port lease {path:?}: {source}")]
    LeaseCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write port lease {path:?}: {source}")]
    LeaseWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove stale port lease {path:?}: {source}")]
    LeaseCleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to check whether pid {pid} is alive: {source}")]
    CheckProcess {
        pid: u32,
        #[source]
        source: io::Error,
    },
}
