//! Error types raised by the RPC client.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use crate::supervisor::SupervisorError;

/// Errors raised while connecting to or calling the bundled server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("failed to read response from {endpoint}: {source}")]
    ReadBody {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("response from {endpoint} is not valid JSON: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("response from {endpoint} has an unexpected shape: {source}")]
    UnexpectedShape {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("server on port {port} did not report ready within {timeout:?}")]
    StartupTimeout { port: u16, timeout: Duration },
    #[error("server exited before reporting ready ({exit_status})")]
    StartupFailed { exit_status: ExitStatus },
    #[error("client has been closed")]
    Closed,
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}
