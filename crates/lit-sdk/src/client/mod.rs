//! RPC client for the bundled server.
//!
//! [`RpcClient::connect`] reuses a server already answering on the
//! configured port, or launches one through a [`ProcessSupervisor`] and waits
//! for it to report ready. The client owns that supervisor, so closing (or
//! dropping) it stops only the process it started.

mod error;
mod readiness;
mod response;
mod state;
mod transport;

use lit_config::Config;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::supervisor::{ProcessSupervisor, SupervisorError};

pub use error::ClientError;
pub use response::{
    Acknowledgement, Execution, KeyPair, MintedWallet, Outcome, RpcResponse, ServerFailure,
    ServerStatus, Signature,
};
pub use state::ClientState;
pub use transport::{Method, RpcRequest};

use readiness::{READY_ENDPOINT, ReadinessPolicy, wait_for_ready};
use transport::HttpTransport;

pub(crate) const CLIENT_TARGET: &str = "lit_sdk::client";

const SET_AUTH_TOKEN_ENDPOINT: &str = "/setAuthToken";
const EXECUTE_ENDPOINT: &str = "/executeJs";
const CREATE_WALLET_ENDPOINT: &str = "/createWallet";
const KEY_PAIR_ENDPOINT: &str = "/pkp";
const SIGN_ENDPOINT: &str = "/sign";
const STATUS_ENDPOINT: &str = "/";

/// Client for the bundled server's HTTP/JSON calls.
#[derive(Debug)]
pub struct RpcClient {
    config: Config,
    transport: HttpTransport,
    supervisor: Option<ProcessSupervisor>,
    state: ClientState,
}

impl RpcClient {
    /// Connects to the bundled server, launching it when nothing answers.
    ///
    /// # Errors
    ///
    /// - `StartupTimeout` when a launched server never reports ready; the
    ///   process is stopped before returning.
    /// - `StartupFailed` when the launched process exits first.
    /// - `Supervisor` when the server cannot be launched.
    pub fn connect(config: Config) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(config.base_url(), config.startup_timeout());
        let mut client = Self {
            config,
            transport,
            supervisor: None,
            state: ClientState::Unstarted,
        };
        client.transition(ClientState::ProbingExisting);
        if client.probe() {
            client.transition(ClientState::UsingExternal);
            client.transition(ClientState::Ready);
            return Ok(client);
        }

        client.transition(ClientState::Launching);
        let mut supervisor = client.launch()?;
        let policy = ReadinessPolicy {
            port: client.config.port,
            timeout: client.config.startup_timeout(),
            interval: client.config.poll_interval(),
        };
        if let Err(error) = wait_for_ready(&client.transport, supervisor.as_mut(), policy) {
            client.transition(ClientState::StartupTimeout);
            if let Some(mut owned) = supervisor
                && let Err(stop_error) = owned.stop()
            {
                warn!(
                    target: CLIENT_TARGET,
                    error = %stop_error,
                    "failed to stop server after unsuccessful startup"
                );
            }
            return Err(error);
        }
        client.supervisor = supervisor;
        client.transition(ClientState::Ready);
        Ok(client)
    }

    /// Starts a supervisor, or returns `None` when another live launcher
    /// already holds the port lease.
    fn launch(&self) -> Result<Option<ProcessSupervisor>, ClientError> {
        let mut supervisor = ProcessSupervisor::from_config(&self.config)?;
        match supervisor.start(self.config.port) {
            Ok(()) => Ok(Some(supervisor)),
            Err(SupervisorError::LeaseHeld { pid }) => {
                info!(
                    target: CLIENT_TARGET,
                    holder = pid,
                    port = self.config.port,
                    "server launch already in progress; waiting without ownership"
                );
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    fn transition(&mut self, next: ClientState) {
        debug!(
            target: CLIENT_TARGET,
            from = %self.state,
            to = %next,
            base_url = self.transport.base_url(),
            "client state change"
        );
        self.state = next;
    }

    fn probe(&self) -> bool {
        self.transport.probe(&RpcRequest::post(READY_ENDPOINT))
    }

    /// Reports whether the server answers `/isReady` with `ready: true`.
    ///
    /// Never fails: transport and decode errors, and a closed client, all
    /// read as not ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state != ClientState::Closed && self.probe()
    }

    /// Forwards an opaque auth token to the server.
    pub fn set_auth_token(&self, token: &str) -> Result<Outcome<Acknowledgement>, ClientError> {
        let request = RpcRequest::post(SET_AUTH_TOKEN_ENDPOINT).with_field("authToken", token);
        self.call(&request)?.decode()
    }

    /// Runs `code` in the server's scripting runtime.
    pub fn execute_code(&self, code: &str) -> Result<Outcome<Execution>, ClientError> {
        let request = RpcRequest::post(EXECUTE_ENDPOINT).with_field("code", code);
        self.call(&request)?.decode()
    }

    /// Runs `code` with `js_params` exposed to the script.
    pub fn execute_code_with_params(
        &self,
        code: &str,
        js_params: Value,
    ) -> Result<Outcome<Execution>, ClientError> {
        let request = RpcRequest::post(EXECUTE_ENDPOINT)
            .with_field("code", code)
            .with_field("jsParams", js_params);
        self.call(&request)?.decode()
    }

    /// Mints a new wallet and returns its key pair.
    pub fn create_wallet(&self) -> Result<Outcome<MintedWallet>, ClientError> {
        self.call(&RpcRequest::post(CREATE_WALLET_ENDPOINT))?
            .decode()
    }

    /// Fetches the key pair the server currently holds.
    pub fn get_key_pair(&self) -> Result<Outcome<KeyPair>, ClientError> {
        self.call(&RpcRequest::get(KEY_PAIR_ENDPOINT))?.decode()
    }

    /// Signs the hex encoded `message` with the server's key pair.
    pub fn sign(&self, message: &str) -> Result<Outcome<Signature>, ClientError> {
        let request = RpcRequest::post(SIGN_ENDPOINT).with_field("toSign", message);
        self.call(&request)?.decode()
    }

    /// Signs `message` with the key pair identified by `public_key`.
    pub fn sign_with_public_key(
        &self,
        message: &str,
        public_key: &str,
    ) -> Result<Outcome<Signature>, ClientError> {
        let request = RpcRequest::post(SIGN_ENDPOINT)
            .with_field("toSign", message)
            .with_field("pkpPublicKey", public_key);
        self.call(&request)?.decode()
    }

    /// Queries the server's status banner.
    pub fn server_status(&self) -> Result<Outcome<ServerStatus>, ClientError> {
        self.call(&RpcRequest::get(STATUS_ENDPOINT))?.decode()
    }

    /// Issues an arbitrary request and returns the raw reply.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after [`close`](Self::close), `Transport` when the
    /// server cannot be reached, and `Decode` when the body is not JSON.
    pub fn call(&self, request: &RpcRequest) -> Result<RpcResponse, ClientError> {
        if self.state == ClientState::Closed {
            return Err(ClientError::Closed);
        }
        self.transport.send(request)
    }

    /// Stops the server this client launched, if any.
    ///
    /// A client using an external server leaves it running. Closing twice is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Supervisor` when the owned process cannot be stopped; the
    /// client stays open so the call may be retried.
    pub fn close(&mut self) -> Result<(), ClientError> {
        if self.state == ClientState::Closed {
            return Ok(());
        }
        if let Some(supervisor) = self.supervisor.as_mut() {
            supervisor.stop()?;
        }
        self.supervisor = None;
        self.transition(ClientState::Closed);
        Ok(())
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ClientState {
        self.state
    }

    /// Whether this client launched, and therefore owns, the server.
    #[must_use]
    pub const fn owns_server(&self) -> bool {
        self.supervisor.is_some()
    }

    /// Supervisor of the launched server, if this client owns one.
    #[must_use]
    pub const fn supervisor(&self) -> Option<&ProcessSupervisor> {
        self.supervisor.as_ref()
    }

    /// Configuration the client was connected with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }
}
