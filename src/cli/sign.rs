//! Sign command implementation

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::signer::{ArchiveSigner, SignError, SigningKey};

/// Run the sign command
pub fn run_sign(
    input: &Path,
    output: &Path,
    key: &Path,
    cert: &Path,
    created_by: Option<&str>,
) -> ExitCode {
    match sign(input, output, key, cert, created_by) {
        Ok(entries) => {
            println!("Signed {} ({} entries)", output.display(), entries);
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn sign(
    input: &Path,
    output: &Path,
    key: &Path,
    cert: &Path,
    created_by: Option<&str>,
) -> Result<usize, SignError> {
    let key = SigningKey::from_files(key, cert)?;
    let source = BufReader::new(File::open(input)?);

    let mut signer = ArchiveSigner::create(output, Some(key))?;
    if let Some(created_by) = created_by {
        signer = signer.with_created_by(created_by);
    }

    let result = signer.write_zip(source, None, None).and_then(|()| signer.close());
    if let Err(e) = result {
        signer.clean_up();
        return Err(e);
    }
    Ok(signer.manifest().len())
}
