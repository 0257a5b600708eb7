//! Parse command implementation

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::diagnostic::{Diagnostic, DiagnosticParser, LineReader, Severity, Tool};

const TOOL_NAMES: &str = "aidl, aapt, javac, dex, zipalign";

/// Run the parse command
pub fn run_parse(tool: &str, log: Option<&Path>, json: bool, all: bool) -> ExitCode {
    let tool = match Tool::from_name(&tool.to_lowercase()) {
        Some(tool) => tool,
        None => {
            eprintln!("Unknown tool '{}'. Available tools: {}", tool, TOOL_NAMES);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    let input: Box<dyn Read> = match log {
        Some(path) => match std::fs::File::open(path) {
            Ok(file) => Box::new(file),
            Err(e) => {
                eprintln!("Error: cannot open {}: {}", path.display(), e);
                return ExitCode::from(EXIT_ERROR);
            }
        },
        None => Box::new(io::stdin()),
    };

    let lines = BufReader::new(input).lines().map_while(Result::ok);
    let mut reader = LineReader::new(lines);
    let parser = DiagnosticParser::new(tool);
    let summary = parser.parse_stream(&mut reader, |diagnostic| print_diagnostic(&diagnostic, json, all));

    if !json {
        eprintln!("{} error(s), {} warning(s)", summary.errors, summary.warnings);
    }
    if summary.errors > 0 {
        ExitCode::from(EXIT_ERROR)
    } else {
        ExitCode::from(EXIT_SUCCESS)
    }
}

fn print_diagnostic(diagnostic: &Diagnostic, json: bool, all: bool) {
    if diagnostic.severity == Severity::Unknown && !all {
        return;
    }
    if json {
        if let Ok(line) = serde_json::to_string(diagnostic) {
            println!("{}", line);
        }
    } else {
        println!("{}", diagnostic);
    }
}
