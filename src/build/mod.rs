//! Build pipeline module for apkpipe
//!
//! Turns sources, resources and libraries into a signed package by running
//! external tools stage by stage.
//!
//! # Overview
//!
//! - **Stages**: CLEAN, GENERATE_RESOURCES, COMPILE, CONVERT, PACKAGE, SIGN,
//!   ALIGN, PUBLISH, strictly in that order
//! - **Tools**: each external tool runs in its own process group; its output
//!   is parsed into diagnostics while it runs
//! - **Outcome**: every run ends in a [`BuildResult`] that is succeeded,
//!   failed at a stage, or cancelled
//!
//! # Example
//!
//! ```ignore
//! use apkpipe::build::{BuildRequest, CancelToken, Pipeline, Toolchain};
//! use apkpipe::build::progress::ConsoleProgress;
//!
//! let pipeline = Pipeline::new(toolchain);
//! let result = pipeline.run(&request, &ConsoleProgress::new(), &CancelToken::new());
//! println!("{}", result.summary());
//! ```

pub mod cancel;
pub mod layout;
pub mod lines;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod request;
pub mod result;
pub mod stage;
mod stages;
pub mod task;
pub mod toolchain;

pub use cancel::*;
pub use layout::*;
pub use lines::*;
pub use pipeline::*;
pub use process::*;
pub use request::*;
pub use result::*;
pub use stage::*;
pub use task::*;
pub use toolchain::*;
