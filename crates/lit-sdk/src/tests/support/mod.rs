//! Test support for SDK behavioural coverage.
//!
//! Supplies a fake bundled server and temporary install directories with
//! shell scripts standing in for the server artefact.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::thread;

use anyhow::{Context, Result, anyhow};
use camino::Utf8PathBuf;
use lit_config::Config;
use tempfile::TempDir;

pub(crate) use crate::test_support::{FakeServer, Reply, key_pair, runtime_reply};

/// File the stand-in artefact creates once it is running.
pub(crate) const MARKER_FILE: &str = "server.pid";

/// Script that records its pid and port, then idles until killed.
pub(crate) const IDLE_SCRIPT: &str =
    "echo \"booting on $PORT\"\necho $$ > server.pid\nexec sleep 30\n";

/// Temporary install directory holding a stand-in server artefact.
pub(crate) struct Install {
    dir: TempDir,
}

impl Install {
    /// Creates an install directory whose artefact runs `script` under `sh`.
    pub fn with_script(script: &str) -> Result<Self> {
        let dir = TempDir::new().context("create install dir")?;
        fs::write(dir.path().join("server.sh"), script).context("write server script")?;
        Ok(Self { dir })
    }

    /// Creates an install directory with no artefact.
    pub fn empty() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new().context("create install dir")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Configuration launching this install's artefact on `port`.
    pub fn config(&self, port: u16) -> Result<Config> {
        let install_dir = Utf8PathBuf::from_path_buf(self.dir.path().to_path_buf())
            .map_err(|path| anyhow!("install dir is not UTF-8: {}", path.display()))?;
        Ok(Config {
            host: String::from("127.0.0.1"),
            port,
            install_dir: Some(install_dir),
            server_script: String::from("server.sh"),
            node_binary: String::from("sh"),
            startup_timeout_ms: 5_000,
            poll_interval_ms: 20,
            ..Config::default()
        })
    }

    /// Reads the pid the artefact recorded once it started.
    pub fn recorded_pid(&self) -> Result<u32> {
        let path = self.file(MARKER_FILE);
        let content = wait_for_file(&path, Duration::from_secs(5))?;
        content.trim().parse().context("parse recorded pid")
    }
}

/// Waits for `path` to exist with non-empty content and returns it.
pub(crate) fn wait_for_file(path: &Path, timeout: Duration) -> Result<String> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(content) = fs::read_to_string(path)
            && !content.trim().is_empty()
        {
            return Ok(content);
        }
        if Instant::now() >= deadline {
            return Err(anyhow!("{} did not appear", path.display()));
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Returns a loopback port with no listener.
pub(crate) fn free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).context("bind probe port")?;
    let port = listener.local_addr().context("local addr")?.port();
    drop(listener);
    Ok(port)
}
