//! Server shutdown utilities.
//!
//! Provides the forceful kill-and-wait sequence and the log close step that
//! follows it.

use std::fs::File;
use std::path::Path;
use std::process::{Child, ExitStatus};

use super::error::SupervisorError;

/// Kills the child and waits for it to exit.
///
/// A child that has already exited is reaped without signalling.
pub(super) fn terminate(child: &mut Child) -> Result<ExitStatus, SupervisorError> {
    let pid = child.id();
    let map_error = |source| SupervisorError::TerminationFailed { pid, source };
    if let Some(status) = child.try_wait().map_err(map_error)? {
        return Ok(status);
    }
    child.kill().map_err(map_error)?;
    child.wait().map_err(map_error)
}

/// Flushes the log to disk and releases the handle.
pub(super) fn close_log(log: File, path: &Path) -> Result<(), SupervisorError> {
    log.sync_all()
        .map_err(|source| SupervisorError::LogCloseFailed {
            path: path.to_path_buf(),
            source,
        })?;
    drop(log);
    Ok(())
}
