//! Configuration module for apkpipe projects
//!
//! Provides types and parsing for `apkpipe.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::*;
pub use schema::*;
