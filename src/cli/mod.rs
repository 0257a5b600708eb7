//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod parse;
mod sanitize;
mod sign;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;
/// A build stopped by an interrupt, as a shell reports SIGINT.
pub(crate) const EXIT_CANCELLED: u8 = 130;

/// Environment variable holding a log filter directive.
pub const LOG_ENV: &str = "APKPIPE_LOG";

/// apkpipe - Build, sign and align Android application packages
#[derive(Parser)]
#[command(name = "apkpipe")]
#[command(about = "apkpipe - Build, sign and align Android application packages")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full build pipeline for the project
    Build {
        /// Path to apkpipe.toml (default: search upward from the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override output directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Build the release variant
        #[arg(long)]
        release: bool,

        /// Skip signing even when credentials are configured
        #[arg(long)]
        unsigned: bool,

        /// Override the Java source and target level
        #[arg(long)]
        java_level: Option<String>,

        /// Emit progress as JSON lines on stdout
        #[arg(long)]
        json: bool,
    },

    /// Deduplicate library jars and print the canonical list
    Sanitize {
        /// Library jars to check
        #[arg(required = true)]
        jars: Vec<PathBuf>,

        /// Directory holding the hash cache
        #[arg(short, long, default_value = "build")]
        out: PathBuf,

        /// Read supersession rules from this apkpipe.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Classify a saved tool log into diagnostics
    Parse {
        /// Tool that produced the log: aidl, aapt, javac, dex, zipalign
        tool: String,

        /// Log file (default: stdin)
        log: Option<PathBuf>,

        /// Emit diagnostics as JSON lines
        #[arg(long)]
        json: bool,

        /// Also print lines that matched no known format
        #[arg(long)]
        all: bool,
    },

    /// Sign an existing archive
    Sign {
        /// Archive to sign
        input: PathBuf,

        /// Signed archive to write
        output: PathBuf,

        /// PEM private key
        #[arg(long)]
        key: PathBuf,

        /// PEM or DER certificate
        #[arg(long)]
        cert: PathBuf,

        /// Value for the Created-By attributes
        #[arg(long)]
        created_by: Option<String>,
    },
}

/// Install the log subscriber.
///
/// `APKPIPE_LOG` takes precedence over the `-v` count.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

/// Main entry point for the CLI
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let verbose = cli.verbose > 0;

    match cli.command {
        Commands::Build { config, out, release, unsigned, java_level, json } => {
            build::run_build(build::BuildArgs {
                config,
                out,
                release,
                unsigned,
                java_level,
                json,
                verbose,
            })
        }
        Commands::Sanitize { jars, out, config } => {
            sanitize::run_sanitize(&jars, &out, config.as_deref())
        }
        Commands::Parse { tool, log, json, all } => {
            parse::run_parse(&tool, log.as_deref(), json, all || verbose)
        }
        Commands::Sign { input, output, key, cert, created_by } => {
            sign::run_sign(&input, &output, &key, &cert, created_by.as_deref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build_flags() {
        let cli = Cli::try_parse_from(["apkpipe", "-vv", "build", "--release", "--json", "-o", "dist"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Build { release, json, out, unsigned, .. } => {
                assert!(release);
                assert!(json);
                assert!(!unsigned);
                assert_eq!(out, Some(PathBuf::from("dist")));
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn test_sanitize_requires_jars() {
        assert!(Cli::try_parse_from(["apkpipe", "sanitize"]).is_err());
    }

    #[test]
    fn test_sign_requires_credentials() {
        assert!(Cli::try_parse_from(["apkpipe", "sign", "in.apk", "out.apk"]).is_err());
        let cli = Cli::try_parse_from([
            "apkpipe", "sign", "in.apk", "out.apk", "--key", "k.pem", "--cert", "c.pem",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Sign { created_by: None, .. }));
    }
}
