//! Server process spawning utilities.
//!
//! Resolves the bundled server artefact, opens the append-only log the
//! process writes into, and launches the interpreter with the port exported
//! through `PORT`.

use std::ffi::{OsStr, OsString};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use super::error::SupervisorError;

/// Environment variable carrying the port to the launched server.
pub const PORT_ENV: &str = "PORT";

/// Fails with `NotInstalled` unless the artefact exists.
pub(super) fn locate_artefact(script_path: &Path) -> Result<(), SupervisorError> {
    if script_path.is_file() {
        Ok(())
    } else {
        Err(SupervisorError::NotInstalled {
            path: script_path.to_path_buf(),
        })
    }
}

/// Opens the server log for appending, creating it when missing.
pub(super) fn open_log(path: &Path) -> Result<File, SupervisorError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SupervisorError::OpenLog {
            path: path.to_path_buf(),
            source,
        })
}

/// Inputs needed to launch the server process.
pub(super) struct LaunchSpec<'a> {
    pub(super) program: &'a OsStr,
    pub(super) script_path: &'a Path,
    pub(super) working_dir: &'a Path,
    pub(super) log_path: &'a Path,
    pub(super) port: u16,
}

/// Spawns the server with both output streams redirected into `log`.
///
/// The log handle stays with the caller; the child receives duplicates.
pub(super) fn spawn_server(
    launch: &LaunchSpec<'_>,
    log: &File,
) -> Result<Child, SupervisorError> {
    let clone_log = || {
        log.try_clone().map_err(|source| SupervisorError::OpenLog {
            path: launch.log_path.to_path_buf(),
            source,
        })
    };
    let stdout = clone_log()?;
    let stderr = clone_log()?;
    let mut command = Command::new(launch.program);
    command
        .arg(launch.script_path)
        .current_dir(launch.working_dir)
        .env(PORT_ENV, launch.port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));
    command
        .spawn()
        .map_err(|source| SupervisorError::LaunchFailed {
            program: OsString::from(launch.program),
            source,
        })
}
