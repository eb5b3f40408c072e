//! Client SDK for the bundled scripting server.
//!
//! The SDK launches the bundled Node.js server as a supervised subprocess,
//! waits for it to report ready, and exposes its HTTP/JSON calls through
//! [`RpcClient`]. A server already answering on the configured port is
//! reused and left running on close.
//!
//! ```no_run
//! use lit_config::Config;
//! use lit_sdk::RpcClient;
//!
//! # fn main() -> Result<(), lit_sdk::ClientError> {
//! let mut client = RpcClient::connect(Config::default())?;
//! let execution = client.execute_code("Lit.Actions.setResponse({response: 'hi'})")?;
//! println!("{execution:?}");
//! client.close()?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod supervisor;
pub mod telemetry;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
#[cfg(test)]
mod tests;

pub use client::{
    Acknowledgement, ClientError, ClientState, Execution, KeyPair, Method, MintedWallet, Outcome,
    RpcClient, RpcRequest, RpcResponse, ServerFailure, ServerStatus, Signature,
};
pub use supervisor::{ProcessSupervisor, ServerHandle, SupervisorError};
