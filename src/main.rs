//! apkpipe - Command-line tool for building, signing and aligning Android packages

use std::process::ExitCode;

use apkpipe::cli;

fn main() -> ExitCode {
    cli::run()
}
