//! Supervision of the bundled server subprocess.
//!
//! This module is split into focused submodules:
//! - [`error`] captures the supervision error surface.
//! - [`spawning`] resolves the artefact, opens the log and launches the process.
//! - [`shutdown`] kills the process and closes the log.
//! - [`lease`] guards the port against a second launcher.

mod error;
mod lease;
mod shutdown;
mod spawning;

use std::ffi::OsString;
use std::fs::File;
use std::path::Path;
use std::process::{Child, ExitStatus};

use lit_config::{Config, ServerPaths};
use tracing::{info, warn};

pub use error::SupervisorError;
pub(crate) use lease::PortLease;
#[cfg(test)]
pub(crate) use lease::process_is_alive;
pub use spawning::PORT_ENV;

use shutdown::{close_log, terminate};
use spawning::{LaunchSpec, locate_artefact, open_log, spawn_server};

pub(crate) const SUPERVISOR_TARGET: &str = "lit_sdk::supervisor";

/// Resources owned while a server process is running.
#[derive(Debug)]
pub struct ServerHandle {
    port: u16,
    child: Child,
    log: Option<File>,
    _lease: PortLease,
}

impl ServerHandle {
    /// Port the server was told to listen on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// OS process id of the server.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

/// Starts, monitors and stops the bundled server process.
///
/// A supervisor owns at most one process. It only ever stops a process it
/// started itself.
#[derive(Debug)]
pub struct ProcessSupervisor {
    paths: ServerPaths,
    program: OsString,
    handle: Option<ServerHandle>,
}

impl ProcessSupervisor {
    /// Builds a supervisor for the artefact described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, SupervisorError> {
        let paths = ServerPaths::from_config(config)?;
        Ok(Self::new(paths, OsString::from(&config.node_binary)))
    }

    /// Builds a supervisor launching `program` against the given paths.
    #[must_use]
    pub const fn new(paths: ServerPaths, program: OsString) -> Self {
        Self {
            paths,
            program,
            handle: None,
        }
    }

    /// Launches the server on `port`.
    ///
    /// Returns immediately when this supervisor already owns a process.
    ///
    /// # Errors
    ///
    /// - `NotInstalled` when the artefact is missing.
    /// - `LeaseHeld` when a live launcher already holds the port lease.
    /// - `OpenLog` when the log cannot be opened.
    /// - `LaunchFailed` when the process cannot be created; the log is
    ///   closed before returning.
    pub fn start(&mut self, port: u16) -> Result<(), SupervisorError> {
        if self.handle.is_some() {
            return Ok(());
        }
        locate_artefact(self.paths.script_path())?;
        let mut lease = PortLease::acquire(self.paths.lock_path())?;
        let log = open_log(self.paths.log_path())?;
        let launch = LaunchSpec {
            program: &self.program,
            script_path: self.paths.script_path(),
            working_dir: self.paths.install_dir(),
            log_path: self.paths.log_path(),
            port,
        };
        let child = match spawn_server(&launch, &log) {
            Ok(child) => child,
            Err(error) => {
                drop(log);
                return Err(error);
            }
        };
        let pid = child.id();
        if let Err(error) = lease.record_child(pid) {
            warn!(
                target: SUPERVISOR_TARGET,
                pid,
                error = %error,
                "failed to record server pid in port lease"
            );
        }
        info!(
            target: SUPERVISOR_TARGET,
            pid,
            port,
            script = %self.paths.script_path().display(),
            log = %self.paths.log_path().display(),
            lease = %lease.path().display(),
            "server process launched"
        );
        let handle = ServerHandle {
            port,
            child,
            log: Some(log),
            _lease: lease,
        };
        self.handle = Some(handle);
        Ok(())
    }

    /// Kills the owned process, waits for it, and closes the log.
    ///
    /// A supervisor that owns nothing returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// - `TerminationFailed` when the kill signal cannot be delivered; the
    ///   handle is kept so the caller may retry.
    /// - `LogCloseFailed` when the log cannot be flushed.
    pub fn stop(&mut self) -> Result<(), SupervisorError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        let pid = handle.pid();
        let status = terminate(&mut handle.child)?;
        info!(
            target: SUPERVISOR_TARGET,
            pid,
            status = %status,
            "server process stopped"
        );
        let log = handle.log.take();
        // Dropping the handle releases the port lease.
        self.handle = None;
        match log {
            Some(log) => close_log(log, self.paths.log_path()),
            None => Ok(()),
        }
    }

    /// Reaps the process if it exited on its own, returning its status.
    ///
    /// # Errors
    ///
    /// Returns `MonitorChild` when the process state cannot be queried.
    pub fn try_exit_status(&mut self) -> Result<Option<ExitStatus>, SupervisorError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(None);
        };
        handle
            .child
            .try_wait()
            .map_err(|source| SupervisorError::MonitorChild { source })
    }

    /// Returns whether this supervisor currently owns a process.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Process id of the owned server, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(ServerHandle::pid)
    }

    /// Port of the owned server, if any.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.handle.as_ref().map(ServerHandle::port)
    }

    /// The owned server handle, if any.
    #[must_use]
    pub const fn handle(&self) -> Option<&ServerHandle> {
        self.handle.as_ref()
    }

    /// Path of the log the server writes into.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        self.paths.log_path()
    }

    /// Paths this supervisor launches from.
    #[must_use]
    pub const fn paths(&self) -> &ServerPaths {
        &self.paths
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        if let Err(error) = self.stop() {
            warn!(
                target: SUPERVISOR_TARGET,
                error = %error,
                "failed to stop server while dropping supervisor"
            );
        }
    }
}
