//! Stamp two rotated, semi-transparent text watermarks onto an image.
//!
//! Sharing a scanned ID or a photo with a service is safer when the copy is
//! marked with who it was meant for ("For agency X only - Jan 2, 2021").
//! This crate drives ImageMagick to overlay that text twice: once rotated
//! +30° in maroon, once rotated -30° in navy. All rendering is done by the
//! external tool; the crate builds its argument lists, runs the two passes
//! in order and cleans up the intermediate file.
//!
//! # Quick Start
//!
//! ```no_run
//! use text_watermark::{ProcessOptions, Watermarker};
//!
//! let marker = Watermarker::new();
//! let opts = ProcessOptions { opacity: 0.3, ..ProcessOptions::default() };
//! let output = marker
//!     .add_watermarks("photo.png".as_ref(), "For agency X only", &opts)
//!     .expect("watermarking failed");
//! assert_eq!(output.file_name().unwrap(), "watermark_photo.jpeg");
//! ```
//!
//! # Custom compositors
//!
//! [`Watermarker`] is generic over [`Compositor`], so a different binary (for
//! example ImageMagick 7's `magick`) or an in-process implementation can be
//! plugged in:
//!
//! ```no_run
//! use text_watermark::{ImageMagick, Watermarker};
//!
//! let marker = Watermarker::with_compositor(ImageMagick::new("/usr/local/bin/convert"));
//! ```

#![deny(missing_docs)]

mod engine;
pub mod error;
pub mod magick;
pub mod noise;

pub use engine::{
    default_output_path, intermediate_path, is_supported_image, validate_input, Pass,
    ProcessOptions, ProcessResult, Watermarker, INTERMEDIATE_PREFIX, MAX_INPUT_BYTES,
    OUTPUT_EXTENSION, OUTPUT_PREFIX,
};
pub use error::{Error, Result};
pub use magick::{Compositor, ImageMagick, WatermarkRequest};
