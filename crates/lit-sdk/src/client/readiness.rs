//! Readiness polling after a launch.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::CLIENT_TARGET;
use super::error::ClientError;
use super::transport::{HttpTransport, RpcRequest};
use crate::supervisor::ProcessSupervisor;

pub(super) const READY_ENDPOINT: &str = "/isReady";

/// Timing for the readiness loop.
#[derive(Debug, Clone, Copy)]
pub(super) struct ReadinessPolicy {
    pub(super) port: u16,
    pub(super) timeout: Duration,
    pub(super) interval: Duration,
}

/// Polls `/isReady` until the server answers ready or the deadline passes.
///
/// When `supervisor` owns the launched process, an early exit ends the wait
/// with `StartupFailed` instead of running out the clock.
pub(super) fn wait_for_ready(
    transport: &HttpTransport,
    mut supervisor: Option<&mut ProcessSupervisor>,
    policy: ReadinessPolicy,
) -> Result<(), ClientError> {
    let request = RpcRequest::post(READY_ENDPOINT);
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if transport.probe_within(&request, remaining) {
            info!(
                target: CLIENT_TARGET,
                port = policy.port,
                attempts,
                elapsed_ms = started.elapsed().as_millis(),
                "server reported ready"
            );
            return Ok(());
        }
        if let Some(owned) = supervisor.as_deref_mut()
            && let Some(exit_status) = owned.try_exit_status()?
        {
            return Err(ClientError::StartupFailed { exit_status });
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ClientError::StartupTimeout {
                port: policy.port,
                timeout: policy.timeout,
            });
        }
        debug!(target: CLIENT_TARGET, port = policy.port, attempts, "server not ready yet");
        thread::sleep(policy.interval.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn times_out_when_nothing_listens() {
        let transport =
            HttpTransport::new(String::from("http://127.0.0.1:9"), Duration::from_millis(200));
        let policy = ReadinessPolicy {
            port: 9,
            timeout: Duration::from_millis(250),
            interval: Duration::from_millis(50),
        };
        let started = Instant::now();
        let error = wait_for_ready(&transport, None, policy).expect_err("nothing listens");
        assert!(matches!(
            error,
            ClientError::StartupTimeout { port: 9, .. }
        ));
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn silent_server_cannot_stretch_the_deadline() {
        // The kernel completes the handshake from the backlog; nothing ever
        // reads the request or answers it.
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();
        let transport = HttpTransport::new(
            format!("http://127.0.0.1:{port}"),
            Duration::from_secs(10),
        );
        let policy = ReadinessPolicy {
            port,
            timeout: Duration::from_millis(300),
            interval: Duration::from_millis(50),
        };
        let started = Instant::now();
        let error = wait_for_ready(&transport, None, policy).expect_err("server never answers");
        assert!(matches!(error, ClientError::StartupTimeout { .. }));
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "waited {:?}",
            started.elapsed()
        );
        drop(listener);
    }
}
