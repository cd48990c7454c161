//! Fatal build errors.
//!
//! Only failures that must abort a whole build live here. Missing assets,
//! unknown configuration values and out-of-range TOC entries are handled
//! where they are detected and only logged.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pagewright operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors that abort a document build.
#[derive(Error, Debug)]
pub enum BuildError {
    /// I/O error while reading inputs or writing the output file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The output location cannot be created or written.
    #[error("Output location is not writable: {path}: {reason}")]
    OutputNotWritable { path: PathBuf, reason: String },

    /// Layout produced no page at all.
    #[error("Document produced zero pages")]
    NoPages,

    /// The configuration document itself could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The PDF backend failed to produce bytes.
    #[error("Rendering error: {0}")]
    Render(String),
}
