// ============================================================================
// PaintOver CLI - headless sketch generation, project creation and export
// ============================================================================
//
// Usage examples:
//   paintover sketch -i photo.jpg -o photo_sketch.png
//   paintover sketch -i "shots/*.jpg" --output-dir sketches/ --outline laplacian
//   paintover new -i photo.jpg -o portrait.json
//   paintover export -p portrait.json -o final.png --include-original
//   paintover recipe "#7c4a2d"

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use crate::components::colors::recipe_for;
use crate::io::{DEFAULT_EXPORT_NAME, export_png, load_image, load_project, save_project};
use crate::ops::effects::OutlineStrategy;
use crate::ops::sketch::{SketchOptions, build_sketch};
use crate::project::Project;
use crate::settings::AppSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// PaintOver: turn photos into paintable sketches.
#[derive(Parser, Debug)]
#[command(
    name = "paintover",
    version,
    about = "Turn photos into paintable outline sketches",
    long_about = "Build outline sketches from photos, create layered paint-over\n\
                  projects and flatten them to PNG without opening a UI.\n\n\
                  Example:\n  \
                  paintover sketch -i photo.jpg -o sketch.png\n  \
                  paintover export -p project.json -o final.png"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Mirror log output to stderr and print per-file timing.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert one or more photos into outline sketches (PNG).
    Sketch(SketchArgs),
    /// Run the sketch pipeline on a photo and write a fresh project file.
    New(NewArgs),
    /// Flatten a project file to a PNG.
    Export(ExportArgs),
    /// Print the nearest pigment mixing recipe for a colour.
    Recipe(RecipeArgs),
}

#[derive(Args, Debug)]
pub struct SketchArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.jpg", "shots/*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Outline strategy: color-difference or laplacian (default from settings).
    #[arg(long, value_name = "STRATEGY")]
    pub outline: Option<String>,

    /// Line threshold for the chosen strategy.
    #[arg(long, value_name = "N")]
    pub threshold: Option<f32>,

    /// Skip the Gaussian blur before outlining.
    #[arg(long)]
    pub no_blur: bool,
}

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Source photo.
    #[arg(short, long, value_name = "PHOTO")]
    pub input: PathBuf,

    /// Project file to write (default: paintover-<timestamp>.json).
    #[arg(short, long, value_name = "PROJECT.json")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Project file to flatten.
    #[arg(short, long, value_name = "PROJECT.json")]
    pub project: PathBuf,

    /// Output PNG (default: my-painting.png).
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Use the original photo as background instead of the sketch.
    #[arg(long)]
    pub include_original: bool,
}

#[derive(Args, Debug)]
pub struct RecipeArgs {
    /// Colour as #rgb or #rrggbb.
    pub hex: String,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the selected command and return an OS exit code.
/// `0` = everything succeeded, `1` = one or more inputs failed.
pub fn run(args: CliArgs) -> ExitCode {
    let settings = AppSettings::load();
    let ok = match &args.command {
        Command::Sketch(cmd) => run_sketch(cmd, &settings, args.verbose),
        Command::New(cmd) => report(run_new(cmd, &settings)),
        Command::Export(cmd) => report(run_export(cmd, &settings)),
        Command::Recipe(cmd) => run_recipe(cmd),
    };
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn report(result: Result<PathBuf, String>) -> bool {
    match result {
        Ok(path) => {
            println!("{}", path.display());
            true
        }
        Err(e) => {
            eprintln!("error: {}", e);
            error!("{}", e);
            false
        }
    }
}

// ============================================================================
// sketch
// ============================================================================

/// Resolve `--outline` / `--threshold` / `--no-blur` on top of the saved settings.
pub fn sketch_options(cmd: &SketchArgs, settings: &AppSettings) -> Result<SketchOptions, String> {
    let mut options = SketchOptions::from_settings(settings);
    if let Some(name) = &cmd.outline {
        options.strategy = OutlineStrategy::parse(name)
            .ok_or_else(|| format!("unknown outline strategy '{}'", name))?;
    }
    if let Some(threshold) = cmd.threshold {
        options.strategy = options.strategy.with_threshold(threshold);
    }
    if cmd.no_blur {
        options.blur = false;
    }
    Ok(options)
}

fn run_sketch(cmd: &SketchArgs, settings: &AppSettings, verbose: bool) -> bool {
    let options = match sketch_options(cmd, settings) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {}", e);
            return false;
        }
    };

    let inputs = resolve_inputs(&cmd.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return false;
    }

    // Multiple inputs require --output-dir, not --output
    if inputs.len() > 1 && cmd.output.is_some() && cmd.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return false;
    }

    if let Some(dir) = &cmd.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return false;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input_path, cmd.output.as_deref(), cmd.output_dir.as_deref())
        else {
            eprintln!(
                "  error: cannot determine output path for '{}'.",
                input_path.display()
            );
            any_failure = true;
            continue;
        };

        match sketch_one(input_path, &output_path, &options) {
            Ok(()) => {
                if verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                error!(input = %input_path.display(), "{}", e);
                any_failure = true;
            }
        }
    }

    !any_failure
}

fn sketch_one(input: &Path, output: &Path, options: &SketchOptions) -> Result<(), String> {
    let photo = load_image(input).map_err(|e| format!("load failed: {}", e))?;
    let sketch = build_sketch(&photo, options);
    export_png(&sketch, output).map_err(|e| format!("save failed: {}", e))?;
    info!(input = %input.display(), output = %output.display(), "sketch written");
    Ok(())
}

// ============================================================================
// new / export / recipe
// ============================================================================

fn run_new(cmd: &NewArgs, settings: &AppSettings) -> Result<PathBuf, String> {
    let photo = load_image(&cmd.input).map_err(|e| format!("load failed: {}", e))?;
    let mut project = Project::from_photo(photo, settings);
    let path = cmd
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(crate::io::default_project_file_name()));
    save_project(&mut project, &path).map_err(|e| format!("save failed: {}", e))?;
    Ok(path)
}

fn run_export(cmd: &ExportArgs, settings: &AppSettings) -> Result<PathBuf, String> {
    let project = load_project(&cmd.project, settings).map_err(|e| format!("load failed: {}", e))?;
    let flat = project.export_image(cmd.include_original);
    let path = cmd
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_NAME));
    export_png(&flat, &path).map_err(|e| format!("export failed: {}", e))?;
    Ok(path)
}

fn run_recipe(cmd: &RecipeArgs) -> bool {
    let Some(recipe) = recipe_for(&cmd.hex) else {
        eprintln!("error: '{}' is not a colour (expected #rgb or #rrggbb).", cmd.hex);
        return false;
    };
    println!(
        "{} → {} ({})",
        recipe.target_hex, recipe.entry.name, recipe.entry.hex
    );
    let total = recipe.total_parts();
    for (pigment, parts) in recipe.parts() {
        println!("  {:>2}/{} {}", parts, total, pigment);
    }
    if !recipe.notes().is_empty() {
        println!("  note: {}", recipe.notes());
    }
    true
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, `<stem>_sketch.png`)
/// 3. Fallback: next to the input as `<stem>_sketch.png`
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();
    let file_name = format!("{}_sketch.png", stem);

    if let Some(dir) = output_dir {
        return Some(dir.join(file_name));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(file_name))
}
