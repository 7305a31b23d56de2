// ============================================================================
// RasterLab CLI: headless batch processing via command-line arguments
// ============================================================================
//
// Usage examples:
//   rasterlab -i photo.png --op grayscale --op sharpen -o result.png
//   rasterlab -i photo.png --op '{"type":"Adjust","param":"brightness","value":0.2}' -o out.png
//   rasterlab -i "shots/*.jpg" --ops pipeline.json --output-dir processed/
//   rasterlab -i photo.png --op canny -o edges.rlab       (project with op log)
//
// Operations run through the same Engine the interactive front-end uses, so
// every step is validated, logged and recorded in history.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::io;
use crate::ops::Operation;
use crate::settings::EngineSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// RasterLab headless image processor.
#[derive(Parser, Debug)]
#[command(
    name = "rasterlab",
    about = "RasterLab headless batch image processor",
    long_about = "Apply a pipeline of raster operations to image files without\n\
                  opening an editor. Supports PNG, JPEG, WEBP, BMP, TGA, ICO and\n\
                  TIFF input; write a .rlab project to keep the operation log.\n\n\
                  Example:\n  \
                  rasterlab -i photo.png --op grayscale --op sharpen -o out.png\n  \
                  rasterlab -i \"*.jpg\" --ops pipeline.json --output-dir out/"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Operation to apply, in order. Either a short name (grayscale, inverse,
    /// fliph, flipv, sharpen, canny, equalize) or a JSON operation object.
    #[arg(long = "op", value_name = "OP")]
    pub ops: Vec<String>,

    /// JSON file holding an array of operations, applied after any --op.
    #[arg(long = "ops", value_name = "FILE.json")]
    pub ops_file: Option<PathBuf>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing. Files keep their original name.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Stripe workers per operation (0 = one per hardware thread).
    /// Overrides `worker_threads` from the settings file.
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Log at debug level and echo log events to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let pipeline = match build_pipeline(&args.ops, args.ops_file.as_deref()) {
        Ok(ops) => ops,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let mut settings = EngineSettings::load();
    if let Some(threads) = args.threads {
        settings.worker_threads = threads;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref())
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &pipeline, &settings) {
            Ok(()) => {
                tracing::info!(
                    input = %input_path.display(),
                    output = %output_path.display(),
                    elapsed_ms = file_start.elapsed().as_millis() as u64,
                    "file processed"
                );
                if args.verbose || multi {
                    println!(
                        "  -> {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                tracing::error!(input = %input_path.display(), error = %e, "file failed");
                eprintln!("  error: {e}");
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(input: &Path, output: &Path, pipeline: &[Operation], settings: &EngineSettings) -> Result<()> {
    let mut engine = Engine::open(input, settings.clone())?;

    for op in pipeline {
        engine.transform(op.clone())?;
    }

    if is_project_path(output) {
        io::save_project(engine.image(), &engine.operation_log(), output)
    } else {
        io::save_image(engine.image(), output)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse `--op` values, then append the contents of `--ops`.
pub fn build_pipeline(args: &[String], ops_file: Option<&Path>) -> Result<Vec<Operation>> {
    let mut ops = args.iter().map(|a| parse_op(a)).collect::<Result<Vec<_>>>()?;
    if let Some(path) = ops_file {
        ops.extend(io::load_operations(path)?);
    }
    Ok(ops)
}

/// A JSON object when it looks like one, otherwise a short operation name.
pub fn parse_op(arg: &str) -> Result<Operation> {
    let trimmed = arg.trim();
    if trimmed.starts_with('{') {
        return io::operation_from_json(trimmed);
    }
    Operation::from_name(trimmed)
        .ok_or_else(|| EngineError::InvalidOperation(format!("unknown operation '{trimmed}'")))
}

fn is_project_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("rlab"))
}

/// Literal paths first, then glob matches, in argument order without duplicates.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let literal = PathBuf::from(pattern);
        if literal.exists() {
            push_unique(&mut found, literal);
            continue;
        }
        let entries = match glob::glob(pattern) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "invalid glob");
                eprintln!("warning: invalid glob '{pattern}': {e}");
                continue;
            }
        };
        let mut matched = 0usize;
        for path in entries.flatten() {
            matched += 1;
            push_unique(&mut found, path);
        }
        if matched == 0 {
            eprintln!("warning: pattern '{pattern}' matched no files.");
        }
    }

    found
}

fn push_unique(paths: &mut Vec<PathBuf>, path: PathBuf) {
    if !paths.contains(&path) {
        paths.push(path);
    }
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, keeps the input file name)
/// 3. Fallback: next to the input with an `_out` suffix on the stem
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    if let Some(dir) = output_dir {
        return Some(dir.join(input.file_name()?));
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();
    let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("png");
    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{stem}_out.{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::adjustments::AdjustParam;

    #[test]
    fn test_parse_op_accepts_names_and_json() {
        assert_eq!(parse_op("grayscale").unwrap(), Operation::Grayscale);
        assert_eq!(parse_op(" flip-v ").unwrap(), Operation::FlipVertical);
        let op = parse_op(r#"{"type":"Adjust","param":"brightness","value":0.25}"#).unwrap();
        assert_eq!(op, Operation::Adjust { param: AdjustParam::Brightness, value: 0.25 });
    }

    #[test]
    fn test_parse_op_rejects_unknown_name() {
        assert!(matches!(parse_op("sepia"), Err(EngineError::InvalidOperation(_))));
    }

    #[test]
    fn test_output_path_priority() {
        let input = Path::new("shots/a.jpg");
        assert_eq!(
            build_output_path(input, Some(Path::new("x.png")), Some(Path::new("out"))),
            Some(PathBuf::from("x.png"))
        );
        assert_eq!(build_output_path(input, None, Some(Path::new("out"))), Some(PathBuf::from("out/a.jpg")));
        assert_eq!(build_output_path(input, None, None), Some(PathBuf::from("shots/a_out.jpg")));
    }

    #[test]
    fn test_cli_flags_parse() {
        let args = CliArgs::try_parse_from([
            "rasterlab", "-i", "a.png", "b.png", "--op", "grayscale", "--op", "sharpen", "--threads", "2",
            "--output-dir", "out",
        ])
        .unwrap();
        assert_eq!(args.input, vec!["a.png", "b.png"]);
        assert_eq!(args.ops, vec!["grayscale", "sharpen"]);
        assert_eq!(args.threads, Some(2));
        assert!(args.output.is_none());
    }

    #[test]
    fn test_inputs_are_deduplicated() {
        let dir = std::env::temp_dir().join(format!("rasterlab_cli_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let a = dir.join("a.png");
        let b = dir.join("b.png");
        std::fs::write(&a, b"").unwrap();
        std::fs::write(&b, b"").unwrap();

        let patterns = vec![
            a.to_string_lossy().into_owned(),
            dir.join("*.png").to_string_lossy().into_owned(),
            dir.join("*.nothing").to_string_lossy().into_owned(),
        ];
        assert_eq!(resolve_inputs(&patterns), vec![a, b]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_project_extension_detection() {
        assert!(is_project_path(Path::new("out.RLAB")));
        assert!(!is_project_path(Path::new("out.png")));
    }
}
