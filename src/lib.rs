//! apkpipe - Library for building Android application packages on the device
//!
//! This library provides functionality to:
//! - Run the tool pipeline from a clean tree to a signed, aligned package
//! - Turn raw tool output into structured diagnostics as it streams
//! - Deduplicate library jars by name and content
//! - Write jar-signed archives with a manifest, signature file and PKCS#7 block

pub mod build;
pub mod cli;
pub mod config;
pub mod diagnostic;
pub mod sanitizer;
pub mod signer;
