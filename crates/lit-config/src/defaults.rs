use std::time::Duration;

use crate::logging::LogFormat;

/// Default host the bundled server is reached on.
pub const DEFAULT_HOST: &str = "localhost";

/// Default TCP port the bundled server listens on.
pub const DEFAULT_PORT: u16 = 3092;

/// File name of the bundled server artefact inside the install directory.
pub const DEFAULT_SERVER_SCRIPT: &str = "bundled_server.js";

/// Interpreter used to launch the bundled server.
pub const DEFAULT_NODE_BINARY: &str = "node";

/// File name of the append-only server log beside the artefact.
pub const DEFAULT_LOG_FILE: &str = "server.log";

/// Readiness deadline applied when launching the server.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between readiness probes while waiting for the server.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default host the bundled server is reached on.
pub fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

/// Default artefact file name.
pub fn default_server_script() -> String {
    DEFAULT_SERVER_SCRIPT.to_owned()
}

/// Default interpreter binary.
pub fn default_node_binary() -> String {
    DEFAULT_NODE_BINARY.to_owned()
}

/// Default log file name.
pub fn default_log_file() -> String {
    DEFAULT_LOG_FILE.to_owned()
}

/// Default readiness deadline in milliseconds.
pub fn default_startup_timeout_ms() -> u64 {
    millis(DEFAULT_STARTUP_TIMEOUT)
}

/// Default probe interval in milliseconds.
pub fn default_poll_interval_ms() -> u64 {
    millis(DEFAULT_POLL_INTERVAL)
}

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
