//! Error types for pattern generation.

use std::io;
use thiserror::Error;

/// Errors that can occur while configuring or generating a print.
#[derive(Error, Debug)]
pub enum Error {
    /// Writing the G-code failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A tool number that the printer doesn't have.
    #[error("Unknown tool {0} in tool list")]
    UnknownTool(u32),

    /// An extruding move was requested before any tool was selected.
    #[error("No active tool, call tool_change first")]
    NoActiveTool,

    /// A parameter that would produce degenerate geometry.
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The config file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
