// ============================================================================
// CutoutFE CLI — headless batch editing via command-line arguments
// ============================================================================
//
// Usage examples:
//   cutoutfe -i cat.png -e "erase:40,40:12" -e "enhance:saturation=50"
//   cutoutfe -i shots/*.png --display 512x512 -e "object:100,80" -e "resize:small"
//   cutoutfe -i a.png b.png -e "style:pixel_art=60" --output-dir out/
//
// Every input becomes one session. The edits are applied in order to every
// session, then one finalize job replays all of them at full resolution and
// writes `<stem>.png` into the output directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, atomic::AtomicBool};
use std::time::Instant;

use clap::Parser;

use crate::coords::{Point, Size};
use crate::manager::{EditManager, ImageSource};
use crate::ops::{
    AssertOp, BrushMode, BrushStroke, Edit, Enhancements, PixelOp, PointAnnotation, PointLabel,
    ResizeSpec, SizePreset, Styles, WholeImageOp,
};
use crate::settings::EngineSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// CutoutFE headless object editor.
#[derive(Parser, Debug)]
#[command(
    name = "cutoutfe",
    about = "CutoutFE headless batch cut-out editor",
    long_about = "Apply mask, enhancement, style and resize edits to image files and\n\
                  export the full-resolution result as PNG.\n\n\
                  Edit syntax:\n  \
                  erase:X,Y[;X,Y...]:DIAMETER   fill:X,Y[;X,Y...]:DIAMETER\n  \
                  object:X,Y   background:X,Y\n  \
                  enhance:denoise=N,edges=N,white_balance=N,color_balance=N,saturation=N,refine_edges=N\n  \
                  style:pixel_art=N,cel_shading=N,anime=N,dithered=N,game_boy=N,simple_animation=N\n  \
                  resize:original|tiny|small|medium|large|huge|+N|-N\n  \
                  undo   redo"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Edit to apply, in order. Repeat for several edits.
    #[arg(short, long = "edit", value_name = "EDIT")]
    pub edits: Vec<String>,

    /// Working (display) resolution box, e.g. 512x512. Point and brush
    /// coordinates are given in this space. Defaults to full resolution.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub display: Option<Size>,

    /// Output directory for finalized PNGs.
    #[arg(long, default_value = "cutoutfe_out", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Settings file. Defaults to the platform config location.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Print per-edit results and timing; echo the log to stderr.
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

    let edits = match args.edits.iter().map(|e| parse_edit(e)).collect::<Result<Vec<_>, _>>() {
        Ok(edits) => edits,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = match &args.settings {
        Some(path) => EngineSettings::load_from(path),
        None => EngineSettings::load(),
    };
    let mut manager = EditManager::new(settings);

    let total = inputs.len();
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if total > 1 || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();
        match run_one(&mut manager, input_path, &edits, args.display, args.verbose) {
            Ok(id) => {
                if args.verbose {
                    println!(
                        "  '{}' edited ({:.0}ms)",
                        id,
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if manager.image_ids().is_empty() {
        return ExitCode::FAILURE;
    }

    let job = match manager.start_finalize(Some(args.output_dir.clone()), Arc::new(AtomicBool::new(false))) {
        Ok(job) => job,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let finalize_start = Instant::now();
    let verbose = args.verbose;
    match job.wait_with_progress(|p| {
        if verbose {
            println!("  finalize {:>3}%", p);
        }
    }) {
        Ok(output) => {
            for path in &output.exported {
                println!("  → {}", path.display());
            }
            if verbose {
                println!(
                    "finalized {} image(s) in {:.0}ms",
                    output.images.len(),
                    finalize_start.elapsed().as_secs_f64() * 1000.0
                );
            }
        }
        Err(e) => {
            eprintln!("error: finalize failed: {}", e);
            any_failure = true;
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing
// ============================================================================

/// Register one input and apply every edit. A failing file is removed from
/// the manager so it is not finalized half-edited.
fn run_one(
    manager: &mut EditManager,
    input: &Path,
    edits: &[Edit],
    display: Option<Size>,
    verbose: bool,
) -> Result<String, String> {
    let id = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| format!("cannot derive a name from '{}'", input.display()))?;
    if manager.image_ids().contains(&id) {
        return Err(format!("duplicate image name '{}'", id));
    }

    manager
        .register_image(&id, ImageSource::Path(input), display)
        .map_err(|e| format!("load failed: {}", e))?;

    for edit in edits {
        match manager.apply_edit(&id, edit.clone()) {
            Ok(outcome) => {
                if verbose {
                    println!(
                        "  {:?}: {} (history {} bytes)",
                        edit.category(),
                        if outcome.changed { "changed" } else { "no change" },
                        manager.history_memory(&id).unwrap_or(0)
                    );
                }
            }
            Err(e) => {
                let _ = manager.remove_image(&id);
                return Err(format!("edit failed: {}", e));
            }
        }
    }
    Ok(id)
}

// ============================================================================
// Edit parsing
// ============================================================================

fn parse_size(s: &str) -> Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{}'", s))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("bad width in '{}'", s))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("bad height in '{}'", s))?;
    Size::new(w, h).validate().map_err(|e| e.to_string())
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{}'", s))?;
    let x = x.trim().parse().map_err(|_| format!("bad x in '{}'", s))?;
    let y = y.trim().parse().map_err(|_| format!("bad y in '{}'", s))?;
    Ok(Point::new(x, y))
}

/// `name=value` pairs separated by commas.
fn parse_sliders(s: &str, mut set: impl FnMut(&str, i32) -> bool) -> Result<(), String> {
    for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected name=value, got '{}'", pair))?;
        let value: i32 = value
            .trim()
            .parse()
            .map_err(|_| format!("bad value in '{}'", pair))?;
        if !set(name.trim(), value) {
            return Err(format!("unknown slider '{}'", name.trim()));
        }
    }
    Ok(())
}

pub fn parse_edit(spec: &str) -> Result<Edit, String> {
    let spec = spec.trim();
    let (kind, rest) = spec.split_once(':').unwrap_or((spec, ""));
    match kind.to_ascii_lowercase().as_str() {
        "undo" => Ok(Edit::Undo),
        "redo" => Ok(Edit::Redo),
        "erase" | "fill" => {
            let (points, diameter) = rest
                .rsplit_once(':')
                .ok_or_else(|| format!("'{}' needs points and a diameter", spec))?;
            let points = points
                .split(';')
                .map(parse_point)
                .collect::<Result<Vec<_>, _>>()?;
            let diameter: f32 = diameter
                .trim()
                .parse()
                .map_err(|_| format!("bad diameter in '{}'", spec))?;
            if !diameter.is_finite() || diameter < 0.0 {
                return Err(format!("diameter must be a finite, non-negative number in '{}'", spec));
            }
            let mode = if kind.eq_ignore_ascii_case("erase") { BrushMode::Erase } else { BrushMode::Fill };
            Ok(Edit::Pixel(PixelOp::Brush(BrushStroke { points, diameter, mode })))
        }
        "object" | "background" => {
            let label = if kind.eq_ignore_ascii_case("object") {
                PointLabel::Object
            } else {
                PointLabel::Background
            };
            Ok(Edit::Pixel(PixelOp::Annotate(PointAnnotation {
                point: parse_point(rest)?,
                label,
            })))
        }
        "enhance" => {
            let mut e = Enhancements::default();
            parse_sliders(rest, |name, v| {
                let slot = match name {
                    "denoise" => &mut e.denoise,
                    "edges" => &mut e.edges,
                    "white_balance" => &mut e.white_balance,
                    "color_balance" => &mut e.color_balance,
                    "saturation" => &mut e.saturation,
                    "refine_edges" => &mut e.refine_edges,
                    _ => return false,
                };
                *slot = v;
                true
            })?;
            Ok(Edit::WholeImage(WholeImageOp::Enhance(e)))
        }
        "style" => {
            let mut s = Styles::default();
            parse_sliders(rest, |name, v| {
                let slot = match name {
                    "pixel_art" => &mut s.pixel_art,
                    "cel_shading" => &mut s.cel_shading,
                    "anime" => &mut s.anime,
                    "dithered" => &mut s.dithered,
                    "game_boy" => &mut s.game_boy,
                    "simple_animation" => &mut s.simple_animation,
                    _ => return false,
                };
                *slot = v;
                true
            })?;
            Ok(Edit::WholeImage(WholeImageOp::Stylize(s)))
        }
        "resize" => {
            let rest = rest.trim();
            let spec = if rest.starts_with(['+', '-']) || rest.chars().all(|c| c.is_ascii_digit()) {
                let v: i32 = rest.parse().map_err(|_| format!("bad resize value '{}'", rest))?;
                ResizeSpec::Slider(v.clamp(-100, 100))
            } else {
                ResizeSpec::Preset(rest.parse::<SizePreset>()?)
            };
            Ok(Edit::Assert(AssertOp::Resize(spec)))
        }
        other => Err(format!("unknown edit '{}'", other)),
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_brush_and_points() {
        match parse_edit("erase:10,10;12,14:8").unwrap() {
            Edit::Pixel(PixelOp::Brush(s)) => {
                assert_eq!(s.points, vec![Point::new(10, 10), Point::new(12, 14)]);
                assert_eq!(s.diameter, 8.0);
                assert_eq!(s.mode, BrushMode::Erase);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse_edit("background:3,4").unwrap(),
            Edit::Pixel(PixelOp::Annotate(PointAnnotation { label: PointLabel::Background, .. }))
        ));
    }

    #[test]
    fn rejects_unbounded_diameters() {
        assert!(parse_edit("erase:1,1:inf").is_err());
        assert!(parse_edit("fill:1,1:NaN").is_err());
        assert!(parse_edit("fill:1,1:-3").is_err());
    }

    #[test]
    fn parses_sliders_and_resize() {
        assert_eq!(
            parse_edit("enhance:saturation=50, denoise=10").unwrap(),
            Edit::WholeImage(WholeImageOp::Enhance(Enhancements {
                saturation: 50,
                denoise: 10,
                ..Default::default()
            }))
        );
        assert_eq!(
            parse_edit("resize:-40").unwrap(),
            Edit::Assert(AssertOp::Resize(ResizeSpec::Slider(-40)))
        );
        assert_eq!(
            parse_edit("resize:Medium").unwrap(),
            Edit::Assert(AssertOp::Resize(ResizeSpec::Preset(SizePreset::Medium)))
        );
        assert_eq!(parse_edit("UNDO").unwrap(), Edit::Undo);
    }

    #[test]
    fn rejects_malformed_edits() {
        assert!(parse_edit("erase:10,10").is_err());
        assert!(parse_edit("style:sparkle=3").is_err());
        assert!(parse_edit("rotate:90").is_err());
        assert!(parse_size("0x10").is_err());
        assert_eq!(parse_size("640x480").unwrap(), Size::new(640, 480));
    }
}
