//! Pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the build, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Remove intermediate artifacts of a previous build
    Clean,
    /// Compile interface definitions and resources
    GenerateResources,
    /// Compile Java sources
    Compile,
    /// Convert class files to dex
    Convert,
    /// Sanitize libraries and assemble the unsigned package
    Package,
    /// Sign the package
    Sign,
    /// Align the signed package
    Align,
    /// Copy the final package to the output directory
    Publish,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 8] = [
        Stage::Clean,
        Stage::GenerateResources,
        Stage::Compile,
        Stage::Convert,
        Stage::Package,
        Stage::Sign,
        Stage::Align,
        Stage::Publish,
    ];

    /// Upper-case tag used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Clean => "CLEAN",
            Stage::GenerateResources => "GENERATE_RESOURCES",
            Stage::Compile => "COMPILE",
            Stage::Convert => "CONVERT",
            Stage::Package => "PACKAGE",
            Stage::Sign => "SIGN",
            Stage::Align => "ALIGN",
            Stage::Publish => "PUBLISH",
        }
    }

    /// Position in [`Stage::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// This stage followed by every later one.
    pub fn and_later(self) -> &'static [Stage] {
        &Self::ALL[self.index()..]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
