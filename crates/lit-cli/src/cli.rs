//! Command-line grammar for the `lit` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "lit",
    about = "Talks to the bundled scripting server, launching it when needed.",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Runs a script in the server's runtime.
    Exec {
        /// Script file to run, or `-` to read it from stdin.
        #[arg(value_name = "FILE")]
        script: PathBuf,
        /// JSON object exposed to the script as `jsParams`.
        #[arg(long, value_name = "JSON")]
        params: Option<String>,
    },
    /// Mints a new wallet.
    Wallet,
    /// Prints the key pair the server currently holds.
    Pkp,
    /// Signs a hex encoded message.
    Sign {
        #[arg(value_name = "HEX")]
        message: String,
        /// Public key of the key pair to sign with.
        #[arg(long, value_name = "KEY")]
        public_key: Option<String>,
    },
    /// Prints the server status banner.
    Status,
}

impl Command {
    /// Whether the command needs the configured auth token forwarded first.
    pub(crate) const fn requires_auth(&self) -> bool {
        matches!(self, Self::Exec { .. } | Self::Wallet | Self::Sign { .. })
    }
}
