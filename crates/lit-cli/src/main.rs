//! CLI entrypoint for the bundled scripting server.
//!
//! The binary delegates to [`lit_cli::run`], which loads configuration,
//! connects to (or launches) the server, issues one call and prints the
//! reply as JSON.

use std::io::{self, StderrLock, StdinLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdin: StdinLock<'_> = io::stdin().lock();
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    lit_cli::run(std::env::args_os(), &mut stdin, &mut stdout, &mut stderr)
}
