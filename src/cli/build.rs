//! Build command implementation

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use super::{EXIT_CANCELLED, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::progress::{ConsoleProgress, JsonProgress, ProgressReporter};
use crate::build::request::Variant;
use crate::build::result::BuildState;
use crate::build::task::submit;
use crate::config::loader::{
    build_request, default_config, find_config, load_config, merge_cli_overrides, pipeline,
    project_root, CliOverrides,
};
use tracing::warn;

/// Arguments of the build command
#[derive(Debug, Default)]
pub struct BuildArgs {
    pub config: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub release: bool,
    pub unsigned: bool,
    pub java_level: Option<String>,
    pub json: bool,
    pub verbose: bool,
}

/// Run the build command
pub fn run_build(args: BuildArgs) -> ExitCode {
    let config_path = args.config.clone().or_else(find_config);
    let (config, root) = match config_path {
        Some(config_path) => {
            if args.verbose && !args.json {
                eprintln!("Using config: {}", config_path.display());
            }
            let cfg = match load_config(Some(&config_path)) {
                Ok(cfg) => cfg,
                Err(e) => {
                    eprintln!("Error loading config: {}", e);
                    return ExitCode::from(EXIT_ERROR);
                }
            };
            let root = project_root(&config_path)
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
            (cfg, root)
        }
        None => {
            if args.verbose && !args.json {
                eprintln!("No apkpipe.toml found, using defaults");
            }
            (default_config(), std::env::current_dir().unwrap_or_default())
        }
    };

    let mut config = config;
    let overrides = CliOverrides {
        out: args.out.clone(),
        variant: args.release.then_some(Variant::Release),
        java_level: args.java_level.clone(),
        unsigned: Some(args.unsigned),
    };
    merge_cli_overrides(&mut config, &overrides);

    let request = match build_request(&config, &root) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let pipeline = Arc::new(pipeline(&config, &root));

    let reporter: Arc<dyn ProgressReporter> = if args.json {
        Arc::new(JsonProgress::new())
    } else {
        Arc::new(
            ConsoleProgress::new()
                .with_colors(atty::is(atty::Stream::Stderr))
                .with_verbose(args.verbose),
        )
    };

    let handle = match submit(pipeline, request, reporter) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: failed to start build: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let token = handle.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        warn!("cannot install interrupt handler: {}", e);
    }

    let result = handle.wait();
    if !args.json {
        if result.is_success() {
            println!("{}", result.summary());
        } else {
            eprintln!("{}", result.summary());
        }
    }

    ExitCode::from(exit_code(result.state))
}

/// Process exit status for a finished build.
fn exit_code(state: BuildState) -> u8 {
    match state {
        BuildState::Succeeded => EXIT_SUCCESS,
        BuildState::Failed => EXIT_ERROR,
        BuildState::Cancelled => EXIT_CANCELLED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_per_state() {
        assert_eq!(exit_code(BuildState::Succeeded), EXIT_SUCCESS);
        assert_eq!(exit_code(BuildState::Failed), EXIT_ERROR);
        assert_eq!(exit_code(BuildState::Cancelled), EXIT_CANCELLED);
        assert_ne!(EXIT_CANCELLED, EXIT_ERROR);
    }
}
