//! Error types for the text-watermark crate.

use std::path::PathBuf;

/// Errors that can occur while stamping watermarks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input image does not exist.
    #[error("input image not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// The input image exceeds the accepted size.
    #[error("input image {} is {size} bytes, over the {limit} byte limit", .path.display())]
    InputTooLarge {
        /// Offending file.
        path: PathBuf,
        /// Its size in bytes.
        size: u64,
        /// Largest accepted size in bytes.
        limit: u64,
    },

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The intermediate file would overwrite the output.
    #[error("intermediate file {} collides with the output path", .0.display())]
    PathConflict(PathBuf),

    /// The external compositing tool could not be started.
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        /// Program that was invoked.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The external compositing tool exited unsuccessfully.
    #[error("`{program}` failed ({}): {output}", exit_label(*.code))]
    ExternalTool {
        /// Program that was invoked.
        program: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Combined stdout/stderr of the process.
        output: String,
    },

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The produced image could not be read back.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "terminated by signal".to_string(),
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
