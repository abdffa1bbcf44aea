use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use text_watermark::{
    default_output_path, ImageMagick, Pass, ProcessOptions, ProcessResult, Watermarker,
};

#[derive(Parser)]
#[command(
    name = "watermark",
    about = "Add watermarks to images",
    version,
    after_help = "Simple usage: watermark <image> \"For agency X only\"\n\
                  Writes watermark_<name>.jpeg next to the input.\n\n\
                  NOTE: Requires ImageMagick's `convert` (use --convert to point elsewhere)."
)]
struct Cli {
    /// The input image (or a directory of images)
    image: String,

    /// The watermark text (`\n` starts a new line)
    text: String,

    /// Text size
    #[arg(long, default_value_t = 100)]
    size: u32,

    /// Text opacity, between 0 and 1 (values outside this range are rejected)
    #[arg(long, default_value_t = 0.4)]
    opacity: f32,

    /// Color of the first watermark
    #[arg(long, default_value = "maroon")]
    first_color: String,

    /// Rotation of the first watermark, in degrees
    #[arg(long, default_value_t = 30.0, allow_negative_numbers = true)]
    first_rotation: f64,

    /// Color of the second watermark
    #[arg(long, default_value = "navy")]
    second_color: String,

    /// Rotation of the second watermark, in degrees
    #[arg(long, default_value_t = -30.0, allow_negative_numbers = true)]
    second_rotation: f64,

    /// Font name or font file for the text
    #[arg(long)]
    font: Option<String>,

    /// Add random noise of up to this many levels per pixel (0 = off)
    #[arg(long, default_value_t = 0)]
    noise: u8,

    /// Output file or directory (default: watermark_{name}.jpeg)
    #[arg(short, long)]
    output: Option<String>,

    /// ImageMagick program to run
    #[arg(long, default_value = "convert")]
    convert: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if !(0.0..=1.0).contains(&cli.opacity) {
        eprintln!("Error: Opacity must be between 0.0 and 1.0");
        process::exit(1);
    }

    if cli.size == 0 {
        eprintln!("Error: Size must be greater than 0");
        process::exit(1);
    }

    let opts = ProcessOptions {
        size: cli.size,
        opacity: cli.opacity,
        passes: [
            Pass::new(cli.first_rotation, cli.first_color.as_str()),
            Pass::new(cli.second_rotation, cli.second_color.as_str()),
        ],
        font: cli.font.clone(),
        noise: cli.noise,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    let text = cli.text.replace("\\n", "\n");

    let marker = Watermarker::with_compositor(ImageMagick::new(&cli.convert));

    let input_path = Path::new(&cli.image);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.image);
        process::exit(1);
    }

    let results = if input_path.is_dir() {
        let output_dir = if let Some(o) = &cli.output {
            PathBuf::from(o)
        } else {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: watermark <input_dir> <text> -o <output_dir>");
            process::exit(1);
        };
        marker.process_directory(input_path, &output_dir, &text, &opts)
    } else {
        let output_path = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path),
        };
        vec![marker.process_file(input_path, &output_path, &text, &opts)]
    };

    let mut success_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, &opts);
        if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !opts.quiet {
        eprintln!();
        eprint!("[Summary] Watermarked: {success_count}");
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, opts: &ProcessOptions) {
    if opts.quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.success {
        eprintln!("[OK] {filename} -> {}", result.output.display());
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if opts.verbose && result.success {
        eprintln!("  -> {}", result.message);
    }
}
