//! Shared configuration for the supervised runtime bridge.
//!
//! [`Config`] is loaded through `ortho_config`, layering built-in defaults,
//! an optional configuration file, `LIT_*` environment variables and CLI
//! flags. The SDK and the `lit` binary both read it so they agree on where
//! the bundled server lives, how it is launched and how it is reached.

mod defaults;
mod logging;
mod paths;

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILE, DEFAULT_LOG_FILTER, DEFAULT_NODE_BINARY, DEFAULT_POLL_INTERVAL,
    DEFAULT_PORT, DEFAULT_SERVER_SCRIPT, DEFAULT_STARTUP_TIMEOUT, default_host, default_log_file,
    default_log_filter, default_log_filter_string, default_log_format, default_node_binary,
    default_poll_interval_ms, default_server_script, default_startup_timeout_ms,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use paths::{ServerPaths, ServerPathsError};

/// Runtime configuration shared by the SDK and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "LIT")]
pub struct Config {
    /// Host the bundled server is reached on.
    #[ortho_config(default = default_host())]
    pub host: String,
    /// TCP port the bundled server listens on; exported to it as `PORT`.
    #[ortho_config(default = DEFAULT_PORT)]
    pub port: u16,
    /// Directory containing the server artefact. Defaults to the directory
    /// of the running executable.
    pub install_dir: Option<Utf8PathBuf>,
    /// File name of the server artefact inside the install directory.
    #[ortho_config(default = default_server_script())]
    pub server_script: String,
    /// Interpreter used to launch the artefact.
    #[ortho_config(default = default_node_binary())]
    pub node_binary: String,
    /// File name of the server log inside the install directory.
    #[ortho_config(default = default_log_file())]
    pub log_file: String,
    /// Readiness deadline, in milliseconds, applied after a launch.
    #[ortho_config(default = default_startup_timeout_ms())]
    pub startup_timeout_ms: u64,
    /// Delay between readiness probes, in milliseconds.
    #[ortho_config(default = default_poll_interval_ms())]
    pub poll_interval_ms: u64,
    /// Opaque token forwarded to the server before authenticated calls.
    pub auth_token: Option<String>,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log records.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            install_dir: None,
            server_script: default_server_script(),
            node_binary: default_node_binary(),
            log_file: default_log_file(),
            startup_timeout_ms: default_startup_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            auth_token: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Base URL every request is issued against.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Readiness deadline applied after launching the server.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Delay between readiness probes.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Configured `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Derives the server artefact paths for this configuration.
    pub fn server_paths(&self) -> Result<ServerPaths, ServerPathsError> {
        ServerPaths::from_config(self)
    }
}
