//! Command-line interface runtime for the bundled scripting server.
//!
//! The module owns argument parsing, configuration bootstrapping and output
//! rendering. Each invocation connects an [`RpcClient`], issues one call,
//! prints the reply as JSON and closes the client, which stops the server
//! again when this invocation launched it. Configuration loading and IO
//! streams can be substituted so tests drive the runtime without a real
//! terminal.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind;
use lit_config::Config;
use lit_sdk::telemetry::{self, TelemetryError};
use lit_sdk::{ClientError, Outcome, RpcClient, ServerFailure};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

mod cli;
mod config;

use cli::{Cli, Command};
use config::{ConfigArgumentSplit, split_config_arguments};
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: keep in sync with the fields of `lit_config::Config`.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--host",
    "--port",
    "--install-dir",
    "--server-script",
    "--node-binary",
    "--log-file",
    "--startup-timeout-ms",
    "--poll-interval-ms",
    "--auth-token",
    "--log-filter",
    "--log-format",
];

const STDIN_SCRIPT: &str = "-";

/// Bundles the IO streams provided to the CLI runtime.
pub(crate) struct IoStreams<'a, R: Read, W: Write, E: Write> {
    pub(crate) stdin: &'a mut R,
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, R, W, E>(args: I, stdin: &mut R, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: Read,
    W: Write,
    E: Write,
{
    let mut io = IoStreams {
        stdin,
        stdout,
        stderr,
    };
    run_with_loader(args, &mut io, &OrthoConfigLoader)
}

/// Runs the CLI with a custom configuration loader.
pub(crate) fn run_with_loader<I, R, W, E, L>(
    args: I,
    io: &mut IoStreams<'_, R, W, E>,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: Read,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);
    let cli_arguments = prepare_cli_arguments(&args, &split);

    let cli = match Cli::try_parse_from(cli_arguments) {
        Ok(cli) => cli,
        Err(error) if is_informational(&error) => {
            let _ = write!(io.stdout, "{error}");
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            let _ = writeln!(io.stderr, "{}", AppError::CliUsage(error));
            return ExitCode::FAILURE;
        }
    };

    match loader
        .load(&split.config_arguments)
        .and_then(|config| execute(cli.command, config, io))
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(io.stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn is_informational(error: &clap::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
    )
}

fn prepare_cli_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    let mut cli_arguments: Vec<OsString> = args.first().cloned().into_iter().collect();
    cli_arguments.extend(args.iter().skip(split.command_start).cloned());
    cli_arguments
}

/// Arguments resolved before the server is contacted, so input errors never
/// launch a server.
enum Request {
    Exec { code: String, params: Option<Value> },
    Wallet,
    Pkp,
    Sign {
        message: String,
        public_key: Option<String>,
    },
    Status,
}

fn execute<R, W, E>(
    command: Command,
    config: Config,
    io: &mut IoStreams<'_, R, W, E>,
) -> Result<(), AppError>
where
    R: Read,
    W: Write,
    E: Write,
{
    telemetry::initialise(&config)?;
    let requires_auth = command.requires_auth();
    let request = resolve_request(command, io.stdin)?;
    let auth_token = config.auth_token.clone().filter(|_| requires_auth);

    let mut client = RpcClient::connect(config)?;
    let result = call(&client, auth_token.as_deref(), request);
    let closed = client.close();
    let reply = result?;
    closed?;
    write_reply(io.stdout, &reply)
}

fn resolve_request<R: Read>(command: Command, stdin: &mut R) -> Result<Request, AppError> {
    Ok(match command {
        Command::Exec { script, params } => {
            let code = read_script(&script, stdin)?;
            let params = params
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .map_err(AppError::InvalidParams)?;
            Request::Exec { code, params }
        }
        Command::Wallet => Request::Wallet,
        Command::Pkp => Request::Pkp,
        Command::Sign {
            message,
            public_key,
        } => Request::Sign {
            message,
            public_key,
        },
        Command::Status => Request::Status,
    })
}

fn read_script<R: Read>(script: &Path, stdin: &mut R) -> Result<String, AppError> {
    if script == Path::new(STDIN_SCRIPT) {
        let mut code = String::new();
        stdin
            .read_to_string(&mut code)
            .map_err(|source| AppError::ReadScript {
                path: script.to_path_buf(),
                source,
            })?;
        return Ok(code);
    }
    fs::read_to_string(script).map_err(|source| AppError::ReadScript {
        path: script.to_path_buf(),
        source,
    })
}

fn call(client: &RpcClient, auth_token: Option<&str>, request: Request) -> Result<Value, AppError> {
    if let Some(token) = auth_token {
        client.set_auth_token(token)?.into_result()?;
    }
    match request {
        Request::Exec {
            code,
            params: Some(params),
        } => payload(client.execute_code_with_params(&code, params)?),
        Request::Exec { code, params: None } => payload(client.execute_code(&code)?),
        Request::Wallet => payload(client.create_wallet()?),
        Request::Pkp => payload(client.get_key_pair()?),
        Request::Sign {
            message,
            public_key: Some(key),
        } => payload(client.sign_with_public_key(&message, &key)?),
        Request::Sign {
            message,
            public_key: None,
        } => payload(client.sign(&message)?),
        Request::Status => payload(client.server_status()?),
    }
}

fn payload<T: Serialize>(outcome: Outcome<T>) -> Result<Value, AppError> {
    let value = outcome.into_result()?;
    serde_json::to_value(value).map_err(AppError::RenderOutput)
}

fn write_reply<W: Write>(stdout: &mut W, reply: &Value) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(reply).map_err(AppError::RenderOutput)?;
    writeln!(stdout, "{rendered}").map_err(AppError::WriteOutput)
}

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to read script {path:?}: {source}")]
    ReadScript { path: PathBuf, source: io::Error },
    #[error("--params must be valid JSON: {0}")]
    InvalidParams(serde_json::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Server(#[from] ServerFailure),
    #[error("failed to render reply: {0}")]
    RenderOutput(serde_json::Error),
    #[error("failed to write reply: {0}")]
    WriteOutput(io::Error),
}
