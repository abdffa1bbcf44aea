//! Single-pass text stamping through ImageMagick.
//!
//! One pass renders the label onto a transparent canvas, trims it, rotates
//! it, pads it with a 10px transparent border, scales its alpha channel by
//! the requested opacity, tiles the stamp over a clone of the input and
//! composites the result over the input:
//!
//! ```text
//! convert IN ( -size S -background none -fill C -gravity center label:T
//!              -trim -rotate R -bordercolor none -border 10
//!              -channel A -evaluate multiply O
//!              -write mpr:wm +delete +clone -fill mpr:wm -draw "color 0,0 reset" )
//!         -compose over -composite OUT
//! ```
//!
//! Every value is passed as its own argument; no shell is involved.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Transparent padding added around the rotated label, in pixels.
const BORDER_PX: u32 = 10;

/// Program name used when none is configured.
pub const DEFAULT_PROGRAM: &str = "convert";

/// Everything needed to stamp one watermark onto one image.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkRequest {
    /// Image to read.
    pub input: PathBuf,
    /// Image to write.
    pub output: PathBuf,
    /// Label text; embedded newlines render as separate lines.
    pub text: String,
    /// Font name or file for `-font`; the tool's default when `None`.
    pub font: Option<String>,
    /// Label size handed to `-size`.
    pub font_size: u32,
    /// Rotation in degrees; positive is clockwise.
    pub rotation_degrees: f64,
    /// Fill color, as a name from the tool's color table.
    pub color: String,
    /// Alpha multiplier in `[0, 1]`. Not clamped.
    pub opacity: f32,
}

/// Something that can carry out a [`WatermarkRequest`].
///
/// [`ImageMagick`] is the production implementation.
pub trait Compositor {
    /// Write `request.output` as `request.input` with the stamp composited on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the stamp could not be produced.
    fn composite(&self, request: &WatermarkRequest) -> Result<()>;
}

/// Runs the ImageMagick `convert` pipeline as a child process.
#[derive(Debug, Clone)]
pub struct ImageMagick {
    program: OsString,
}

impl Default for ImageMagick {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl ImageMagick {
    /// Use `program` (a name on `PATH` or a path) as the `convert` binary.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The program this compositor launches.
    #[must_use]
    pub fn program(&self) -> &Path {
        Path::new(&self.program)
    }

    /// Build the argument vector for one pass.
    #[must_use]
    pub fn args(request: &WatermarkRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(40);
        args.push(safe_path(&request.input).into_os_string());

        let mut stamp = vec![
            "(".to_string(),
            "-size".to_string(),
            request.font_size.to_string(),
        ];
        if let Some(font) = &request.font {
            stamp.push("-font".to_string());
            stamp.push(font.clone());
        }
        stamp.extend([
            "-background".to_string(),
            "none".to_string(),
            "-fill".to_string(),
            request.color.clone(),
            "-gravity".to_string(),
            "center".to_string(),
            format!("label:{}", escape_label(&request.text)),
            "-trim".to_string(),
            "-rotate".to_string(),
            request.rotation_degrees.to_string(),
            "-bordercolor".to_string(),
            "none".to_string(),
            "-border".to_string(),
            BORDER_PX.to_string(),
            "-channel".to_string(),
            "A".to_string(),
            "-evaluate".to_string(),
            "multiply".to_string(),
            request.opacity.to_string(),
            "-write".to_string(),
            "mpr:wm".to_string(),
            "+delete".to_string(),
            "+clone".to_string(),
            "-fill".to_string(),
            "mpr:wm".to_string(),
            "-draw".to_string(),
            "color 0,0 reset".to_string(),
            ")".to_string(),
            "-compose".to_string(),
            "over".to_string(),
            "-composite".to_string(),
        ]);
        args.extend(stamp.into_iter().map(OsString::from));

        args.push(safe_path(&request.output).into_os_string());
        args
    }
}

impl Compositor for ImageMagick {
    fn composite(&self, request: &WatermarkRequest) -> Result<()> {
        let program = self.program().display().to_string();
        let args = Self::args(request);
        log::debug!("running {program} {args:?}");

        let out = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| Error::Launch {
                program: program.clone(),
                source,
            })?;

        if out.status.success() {
            return Ok(());
        }

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));

        Err(Error::ExternalTool {
            program,
            code: out.status.code(),
            output: output.trim().to_string(),
        })
    }
}

/// Escape text so ImageMagick renders it literally.
///
/// A leading `@` would make the tool read the label from a file, and `%`
/// starts a property escape.
#[must_use]
pub fn escape_label(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    if text.starts_with('@') {
        escaped.push('\\');
    }
    for c in text.chars() {
        if c == '%' {
            escaped.push('%');
        }
        escaped.push(c);
    }
    escaped
}

/// Keep relative paths like `-foo.png` from parsing as options.
fn safe_path(path: &Path) -> PathBuf {
    if path.as_os_str().to_string_lossy().starts_with('-') {
        Path::new(".").join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> WatermarkRequest {
        WatermarkRequest {
            input: PathBuf::from("photo.png"),
            output: PathBuf::from("intermediate_photo.png"),
            text: "For agency X only".to_string(),
            font: None,
            font_size: 100,
            rotation_degrees: 30.0,
            color: "maroon".to_string(),
            opacity: 0.4,
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn value_after(args: &[String], flag: &str) -> String {
        let pos = args.iter().position(|a| a == flag).unwrap();
        args[pos + 1].clone()
    }

    #[test]
    fn args_start_with_input_and_end_with_output() {
        let args = strings(&ImageMagick::args(&request()));
        assert_eq!(args.first().unwrap(), "photo.png");
        assert_eq!(args.last().unwrap(), "intermediate_photo.png");
    }

    #[test]
    fn args_carry_every_style_parameter() {
        let args = strings(&ImageMagick::args(&request()));
        assert_eq!(value_after(&args, "-size"), "100");
        assert_eq!(value_after(&args, "-rotate"), "30");
        assert_eq!(value_after(&args, "-border"), "10");
        assert_eq!(value_after(&args, "multiply"), "0.4");
        assert_eq!(value_after(&args, "-draw"), "color 0,0 reset");
        assert!(args.contains(&"label:For agency X only".to_string()));
        assert!(args.contains(&"maroon".to_string()));
    }

    #[test]
    fn full_opacity_multiplies_alpha_by_one() {
        let req = WatermarkRequest {
            opacity: 1.0,
            ..request()
        };
        let args = strings(&ImageMagick::args(&req));
        assert_eq!(value_after(&args, "multiply"), "1");
    }

    #[test]
    fn font_is_only_passed_when_set() {
        let args = strings(&ImageMagick::args(&request()));
        assert!(!args.contains(&"-font".to_string()));

        let req = WatermarkRequest {
            font: Some("Courier-New".to_string()),
            ..request()
        };
        let args = strings(&ImageMagick::args(&req));
        assert_eq!(value_after(&args, "-font"), "Courier-New");
        let font_pos = args.iter().position(|a| a == "-font").unwrap();
        let label_pos = args.iter().position(|a| a.starts_with("label:")).unwrap();
        assert!(font_pos < label_pos);
    }

    #[test]
    fn multi_line_text_stays_in_one_label() {
        let req = WatermarkRequest {
            text: "Sent to Hotel Patagonia\nFor check in only".to_string(),
            ..request()
        };
        let args = strings(&ImageMagick::args(&req));
        assert!(args.contains(&"label:Sent to Hotel Patagonia\nFor check in only".to_string()));
    }

    #[test]
    fn negative_rotation_is_passed_verbatim() {
        let req = WatermarkRequest {
            rotation_degrees: -30.0,
            color: "navy".to_string(),
            ..request()
        };
        let args = strings(&ImageMagick::args(&req));
        assert_eq!(value_after(&args, "-rotate"), "-30");
        assert_eq!(value_after(&args, "-fill"), "navy");
    }

    #[test]
    fn shell_metacharacters_stay_in_one_argument() {
        let req = WatermarkRequest {
            text: "x\"; rm -rf / #".to_string(),
            ..request()
        };
        let args = strings(&ImageMagick::args(&req));
        assert!(args.contains(&"label:x\"; rm -rf / #".to_string()));
    }

    #[test]
    fn stamp_group_is_balanced() {
        let args = strings(&ImageMagick::args(&request()));
        let open = args.iter().filter(|a| *a == "(").count();
        let close = args.iter().filter(|a| *a == ")").count();
        assert_eq!(open, 1);
        assert_eq!(close, 1);
    }

    #[test]
    fn escape_label_handles_file_and_percent_escapes() {
        assert_eq!(escape_label("plain"), "plain");
        assert_eq!(escape_label("@/etc/passwd"), "\\@/etc/passwd");
        assert_eq!(escape_label("a@b"), "a@b");
        assert_eq!(escape_label("100% mine"), "100%% mine");
    }

    #[test]
    fn dash_paths_are_made_explicit() {
        let req = WatermarkRequest {
            input: PathBuf::from("-photo.png"),
            ..request()
        };
        let args = strings(&ImageMagick::args(&req));
        assert_eq!(args.first().unwrap(), "./-photo.png");
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let magick = ImageMagick::new("definitely-not-an-installed-convert-binary");
        let err = magick.composite(&request()).unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_captures_output() {
        // `false` ignores its arguments and exits 1.
        let magick = ImageMagick::new("false");
        match magick.composite(&request()).unwrap_err() {
            Error::ExternalTool { program, code, .. } => {
                assert_eq!(program, "false");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn default_program_is_convert() {
        assert_eq!(ImageMagick::default().program(), Path::new("convert"));
    }
}
