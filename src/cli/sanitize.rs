//! Sanitize command implementation

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::config::loader::load_config;
use crate::sanitizer::{default_supersessions, DependencySanitizer, SanitizeError};

/// Run the sanitize command
pub fn run_sanitize(jars: &[PathBuf], out: &Path, config: Option<&Path>) -> ExitCode {
    let supersessions = match config {
        Some(path) => match load_config(Some(path)) {
            Ok(config) => config.sanitizer.supersedes,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                return ExitCode::from(EXIT_ERROR);
            }
        },
        None => default_supersessions(),
    };

    if let Err(e) = std::fs::create_dir_all(out) {
        eprintln!("Error: cannot create {}: {}", out.display(), e);
        return ExitCode::from(EXIT_ERROR);
    }

    let sanitizer = DependencySanitizer::new(out).with_supersessions(supersessions);
    match sanitizer.sanitize(jars) {
        Ok(set) => {
            for note in set.notes() {
                eprintln!("{}", note);
            }
            for file in set.files() {
                println!("{}", file.display());
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e @ SanitizeError::Conflict { .. }) => {
            for line in e.details() {
                eprintln!("{}", line);
            }
            ExitCode::from(EXIT_ERROR)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
