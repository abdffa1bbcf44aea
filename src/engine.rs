//! Two-pass watermark orchestration.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::magick::{Compositor, ImageMagick, WatermarkRequest};
use crate::noise;

/// Prefix of the file written by the first pass.
pub const INTERMEDIATE_PREFIX: &str = "intermediate_";
/// Prefix of the final output file.
pub const OUTPUT_PREFIX: &str = "watermark_";
/// Extension the final output is always written with.
pub const OUTPUT_EXTENSION: &str = "jpeg";

/// Largest input accepted, in bytes.
pub const MAX_INPUT_BYTES: u64 = 50 * 1024 * 1024;

/// Rotation and color of one stamping pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    /// Rotation in degrees.
    pub rotation_degrees: f64,
    /// Color name understood by the compositor.
    pub color: String,
}

impl Pass {
    /// Create a pass.
    pub fn new(rotation_degrees: f64, color: impl Into<String>) -> Self {
        Self {
            rotation_degrees,
            color: color.into(),
        }
    }

    /// The two complementary default passes: +30° maroon, then -30° navy.
    #[must_use]
    pub fn defaults() -> [Pass; 2] {
        [Pass::new(30.0, "maroon"), Pass::new(-30.0, "navy")]
    }
}

/// Options controlling how the stamps are drawn and reported.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Label size.
    pub size: u32,
    /// Stamp opacity (0.0-1.0). Passed through unclamped.
    pub opacity: f32,
    /// First and second pass styles.
    pub passes: [Pass; 2],
    /// Font for the label; the compositor's default when `None`.
    pub font: Option<String>,
    /// Per-pixel noise amplitude added after stamping; 0 disables it.
    pub noise: u8,
    /// Enable verbose logging.
    pub verbose: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            size: 100,
            opacity: 0.4,
            passes: Pass::defaults(),
            font: None,
            noise: 0,
            verbose: false,
            quiet: false,
        }
    }
}

/// Result of watermarking a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the input file.
    pub path: PathBuf,
    /// Path the watermarked image was (or would have been) written to.
    pub output: PathBuf,
    /// Whether processing succeeded.
    pub success: bool,
    /// Human-readable status message.
    pub message: String,
}

/// Applies the two watermark passes using a [`Compositor`].
///
/// ```no_run
/// use text_watermark::{ProcessOptions, Watermarker};
///
/// let marker = Watermarker::new();
/// let out = marker
///     .add_watermarks("photo.png".as_ref(), "For agency X only", &ProcessOptions::default())
///     .unwrap();
/// println!("wrote {}", out.display());
/// ```
pub struct Watermarker<C = ImageMagick> {
    compositor: C,
}

impl Default for Watermarker<ImageMagick> {
    fn default() -> Self {
        Self::new()
    }
}

impl Watermarker<ImageMagick> {
    /// Create a watermarker that runs `convert` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_compositor(ImageMagick::default())
    }
}

impl<C: Compositor> Watermarker<C> {
    /// Create a watermarker around any compositor.
    pub fn with_compositor(compositor: C) -> Self {
        Self { compositor }
    }

    /// The underlying compositor.
    pub fn compositor(&self) -> &C {
        &self.compositor
    }

    /// Stamp both watermarks, writing to [`default_output_path`].
    ///
    /// # Errors
    ///
    /// See [`Watermarker::add_watermarks_to`].
    pub fn add_watermarks(&self, input: &Path, text: &str, opts: &ProcessOptions) -> Result<PathBuf> {
        let output = default_output_path(input);
        self.add_watermarks_to(input, &output, text, opts)?;
        Ok(output)
    }

    /// Stamp both watermarks onto `input`, writing the result to `output`.
    ///
    /// The first pass writes [`intermediate_path`], the second reads it.
    /// Once the first pass has written it, the intermediate file is removed
    /// whether or not the second pass succeeds. With `opts.noise > 0` the
    /// result is re-encoded with noise added.
    ///
    /// # Errors
    ///
    /// Before anything is spawned: [`Error::InputNotFound`] if `input` does
    /// not exist, [`Error::InputTooLarge`] or [`Error::UnsupportedFormat`] if
    /// it fails [`validate_input`], and [`Error::PathConflict`] if the
    /// intermediate file would land on `output`. Afterwards, the
    /// compositor's error if either pass fails, and [`Error::Io`] if the
    /// intermediate file cannot be removed after a successful run.
    pub fn add_watermarks_to(
        &self,
        input: &Path,
        output: &Path,
        text: &str,
        opts: &ProcessOptions,
    ) -> Result<()> {
        validate_input(input)?;

        let intermediate_file = intermediate_path(input, output);
        if intermediate_file.file_name() == output.file_name() {
            return Err(Error::PathConflict(intermediate_file));
        }

        let [first, second] = &opts.passes;
        let mut intermediate = IntermediateFile::new(intermediate_file);

        self.compositor
            .composite(&request(input, intermediate.path(), text, first, opts))?;
        intermediate.arm();
        self.compositor
            .composite(&request(intermediate.path(), output, text, second, opts))?;
        intermediate.remove()?;

        if opts.noise > 0 {
            let mut stamped = image::open(output)?.to_rgb8();
            noise::add_noise(&mut stamped, opts.noise, &mut rand::thread_rng());
            noise::save_image(&stamped, output)?;
        }
        Ok(())
    }

    /// Process a single image file: stamp, then verify the output decodes.
    ///
    /// Returns a [`ProcessResult`] indicating success or failure.
    #[must_use]
    pub fn process_file(
        &self,
        input: &Path,
        output: &Path,
        text: &str,
        opts: &ProcessOptions,
    ) -> ProcessResult {
        let mut result = ProcessResult {
            path: input.to_path_buf(),
            output: output.to_path_buf(),
            success: false,
            message: String::new(),
        };

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    result.message = format!("Failed to create output directory: {e}");
                    return result;
                }
            }
        }

        if let Err(e) = self.add_watermarks_to(input, output, text, opts) {
            result.message = e.to_string();
            return result;
        }

        match image::image_dimensions(output) {
            Ok((w, h)) => {
                result.success = true;
                result.message = format!("Watermarked ({w}x{h})");
            }
            Err(e) => {
                result.message = format!("Output is not a readable image: {e}");
            }
        }

        result
    }

    /// Watermark every supported image in a directory into `output_dir`.
    ///
    /// Files already carrying the output or intermediate prefix are ignored.
    /// Uses parallel iteration when the `cli` feature is enabled (via rayon);
    /// each file's two passes still run in order.
    #[must_use]
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        text: &str,
        opts: &ProcessOptions,
    ) -> Vec<ProcessResult>
    where
        C: Sync,
    {
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p) && !is_generated(p))
                .collect(),
            Err(e) => {
                return vec![ProcessResult {
                    path: input_dir.to_path_buf(),
                    output: output_dir.to_path_buf(),
                    success: false,
                    message: format!("Failed to read directory: {e}"),
                }];
            }
        };
        entries.sort();

        if !output_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(output_dir) {
                return vec![ProcessResult {
                    path: output_dir.to_path_buf(),
                    output: output_dir.to_path_buf(),
                    success: false,
                    message: format!("Failed to create output directory: {e}"),
                }];
            }
        }

        let jobs = plan_outputs(entries, output_dir);

        let run = |(input, output): &(PathBuf, Option<PathBuf>)| match output {
            Some(output) => self.process_file(input, output, text, opts),
            None => ProcessResult {
                path: input.clone(),
                output: output_dir.join(output_file_name(input)),
                success: false,
                message: "Output name collides with another input".to_string(),
            },
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            jobs.par_iter().map(run).collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            jobs.iter().map(run).collect()
        }
    }
}

fn request(
    input: &Path,
    output: &Path,
    text: &str,
    pass: &Pass,
    opts: &ProcessOptions,
) -> WatermarkRequest {
    WatermarkRequest {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        text: text.to_string(),
        font: opts.font.clone(),
        font_size: opts.size,
        rotation_degrees: pass.rotation_degrees,
        color: pass.color.clone(),
        opacity: opts.opacity,
    }
}

/// Check that `input` exists, is no larger than [`MAX_INPUT_BYTES`] and has
/// a supported image extension.
///
/// # Errors
///
/// Returns [`Error::InputNotFound`], [`Error::InputTooLarge`] or
/// [`Error::UnsupportedFormat`].
pub fn validate_input(input: &Path) -> Result<()> {
    let meta = match std::fs::metadata(input) {
        Ok(m) if m.is_file() => m,
        _ => return Err(Error::InputNotFound(input.to_path_buf())),
    };
    if meta.len() > MAX_INPUT_BYTES {
        return Err(Error::InputTooLarge {
            path: input.to_path_buf(),
            size: meta.len(),
            limit: MAX_INPUT_BYTES,
        });
    }
    if !is_supported_image(input) {
        let ext = input.extension().unwrap_or_default().to_string_lossy();
        return Err(Error::UnsupportedFormat(if ext.is_empty() {
            "no extension".to_string()
        } else {
            ext.into_owned()
        }));
    }
    Ok(())
}

/// Pair each input with its output; later inputs whose output name is
/// already taken get `None`.
fn plan_outputs(entries: Vec<PathBuf>, output_dir: &Path) -> Vec<(PathBuf, Option<PathBuf>)> {
    let mut taken = std::collections::HashSet::new();
    entries
        .into_iter()
        .map(|input| {
            let output = output_dir.join(output_file_name(&input));
            let output = taken.insert(output.clone()).then_some(output);
            (input, output)
        })
        .collect()
}

/// Removes the intermediate file when dropped, once armed.
///
/// Starts armed only if nothing exists at the path yet; a file that was
/// already there is left alone unless the first pass overwrote it.
struct IntermediateFile {
    path: PathBuf,
    armed: bool,
    removed: bool,
}

impl IntermediateFile {
    fn new(path: PathBuf) -> Self {
        let armed = !path.exists();
        Self {
            path,
            armed,
            removed: false,
        }
    }

    fn arm(&mut self) {
        self.armed = true;
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn remove(mut self) -> Result<()> {
        self.removed = true;
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

impl Drop for IntermediateFile {
    fn drop(&mut self) {
        if self.removed || !self.armed || !self.path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!(
                "could not remove intermediate file {}: {e}",
                self.path.display()
            );
        }
    }
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "gif" | "tif" | "tiff"
        ),
        None => false,
    }
}

fn is_generated(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(OUTPUT_PREFIX) || n.starts_with(INTERMEDIATE_PREFIX))
}

fn output_file_name(input: &Path) -> String {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    format!("{OUTPUT_PREFIX}{stem}.{OUTPUT_EXTENSION}")
}

/// Generate the default output path from an input path.
///
/// Example: `"photo.png"` becomes `"watermark_photo.jpeg"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(output_file_name(input))
}

/// Path of the first pass's output for `input`, placed beside `output`.
///
/// Example: `("in/photo.png", "out/watermark_photo.jpeg")` gives
/// `"out/intermediate_photo.png"`.
#[must_use]
pub fn intermediate_path(input: &Path, output: &Path) -> PathBuf {
    let name = input.file_name().unwrap_or_default().to_string_lossy();
    let parent = output.parent().unwrap_or(Path::new("."));
    parent.join(format!("{INTERMEDIATE_PREFIX}{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_path_prefixes_and_forces_jpeg() {
        let p = default_output_path(Path::new("/tmp/photo.png"));
        assert_eq!(p, PathBuf::from("/tmp/watermark_photo.jpeg"));

        let p = default_output_path(Path::new("scan.JPG"));
        assert_eq!(
            p.file_name().unwrap().to_str().unwrap(),
            "watermark_scan.jpeg"
        );

        let p = default_output_path(Path::new("noext"));
        assert_eq!(p, PathBuf::from("watermark_noext.jpeg"));
    }

    #[test]
    fn intermediate_path_keeps_input_extension() {
        let p = intermediate_path(
            Path::new("/tmp/photo.png"),
            &default_output_path(Path::new("/tmp/photo.png")),
        );
        assert_eq!(p, PathBuf::from("/tmp/intermediate_photo.png"));
    }

    #[test]
    fn intermediate_path_follows_output_directory() {
        let p = intermediate_path(Path::new("in/photo.tif"), Path::new("out/final.jpeg"));
        assert_eq!(p, PathBuf::from("out/intermediate_photo.tif"));
    }

    #[test]
    fn default_passes_are_complementary() {
        let [first, second] = Pass::defaults();
        assert_eq!(first.rotation_degrees, -second.rotation_degrees);
        assert_eq!(first.color, "maroon");
        assert_eq!(second.color, "navy");
        assert_eq!(ProcessOptions::default().passes, Pass::defaults());
    }

    #[test]
    fn default_options_match_cli_defaults() {
        let opts = ProcessOptions::default();
        assert_eq!(opts.size, 100);
        assert!((opts.opacity - 0.4).abs() < f32::EPSILON);
        assert_eq!(opts.noise, 0);
        assert!(opts.font.is_none());
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.tiff")));
        assert!(is_supported_image(Path::new("photo.gif")));
    }

    #[test]
    fn is_supported_image_rejects_unsupported_formats() {
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("photo")));
    }

    #[test]
    fn generated_files_are_recognized() {
        assert!(is_generated(Path::new("dir/watermark_a.jpeg")));
        assert!(is_generated(Path::new("intermediate_a.png")));
        assert!(!is_generated(Path::new("a.png")));
    }

    #[test]
    fn colliding_outputs_are_rejected() {
        let jobs = plan_outputs(
            vec![PathBuf::from("a.jpg"), PathBuf::from("a.png"), PathBuf::from("b.png")],
            Path::new("out"),
        );
        assert_eq!(jobs[0].1, Some(PathBuf::from("out/watermark_a.jpeg")));
        assert_eq!(jobs[1].1, None);
        assert_eq!(jobs[2].1, Some(PathBuf::from("out/watermark_b.jpeg")));
    }

    #[test]
    fn intermediate_guard_removes_file_it_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intermediate_x.png");
        let guard = IntermediateFile::new(path.clone());
        std::fs::write(&path, b"x").unwrap();
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn intermediate_guard_leaves_preexisting_file_until_armed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intermediate_x.png");
        std::fs::write(&path, b"mine").unwrap();

        drop(IntermediateFile::new(path.clone()));
        assert_eq!(std::fs::read(&path).unwrap(), b"mine");

        let mut guard = IntermediateFile::new(path.clone());
        guard.arm();
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn validate_input_rejects_missing_unsupported_and_oversized() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("nope.png");
        assert!(matches!(validate_input(&missing), Err(Error::InputNotFound(_))));

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"hello").unwrap();
        assert!(matches!(
            validate_input(&text),
            Err(Error::UnsupportedFormat(ext)) if ext == "txt"
        ));

        let big = dir.path().join("huge.png");
        let file = std::fs::File::create(&big).unwrap();
        file.set_len(MAX_INPUT_BYTES + 1).unwrap();
        assert!(matches!(
            validate_input(&big),
            Err(Error::InputTooLarge { size, .. }) if size == MAX_INPUT_BYTES + 1
        ));

        let ok = dir.path().join("ok.png");
        std::fs::write(&ok, b"not decoded here").unwrap();
        assert!(validate_input(&ok).is_ok());
    }

    #[test]
    fn intermediate_remove_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let guard = IntermediateFile::new(dir.path().join("intermediate_gone.png"));
        assert!(matches!(guard.remove(), Err(Error::Io(_))));
    }
}
