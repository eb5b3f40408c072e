use std::fmt;

/// Lifecycle state of an [`RpcClient`](super::RpcClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Constructed, nothing probed yet.
    Unstarted,
    /// Checking whether a server already answers on the port.
    ProbingExisting,
    /// A server was already running; this client does not own it.
    UsingExternal,
    /// Starting a server, or waiting on another launcher's server.
    Launching,
    /// The server reported ready and calls may be made.
    Ready,
    /// The server never became ready.
    StartupTimeout,
    /// `close` succeeded; further calls fail.
    Closed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unstarted => "unstarted",
            Self::ProbingExisting => "probing-existing",
            Self::UsingExternal => "using-external",
            Self::Launching => "launching",
            Self::Ready => "ready",
            Self::StartupTimeout => "startup-timeout",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}
