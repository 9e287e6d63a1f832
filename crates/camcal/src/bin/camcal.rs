//! camcal CLI: batch calibration and single-image detection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use camcal::source::ReplayBackend;
use camcal::{
    default_result_filename, draw_corners, AcquisitionController, AcquisitionError, CalibConfig,
    ChessboardDetector, PatternDetector, PatternGeometry,
};
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "camcal")]
#[command(about = "Checkerboard camera calibration from a batch of images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log debug messages.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON trace events instead of plain log lines.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the board in every image, calibrate and write the result.
    Calibrate(CalibrateArgs),
    /// Detect the board in one image.
    Detect(DetectArgs),
}

#[derive(Debug, Clone, Args)]
struct PatternArgs {
    /// Interior corners per row (overrides the config).
    #[arg(long)]
    cols: Option<u32>,

    /// Interior corners per column (overrides the config).
    #[arg(long)]
    rows: Option<u32>,

    /// JSON session config; defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CalibrateArgs {
    #[command(flatten)]
    pattern: PatternArgs,

    /// Where to write the calibration record (default: calib_<timestamp>.json).
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Calibration images, processed in the given order.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    #[command(flatten)]
    pattern: PatternArgs,

    /// Write the image with the corners drawn on it.
    #[arg(long)]
    overlay: Option<PathBuf>,

    image: PathBuf,
}

fn load_config(args: &PatternArgs) -> CliResult<CalibConfig> {
    let mut cfg = match &args.config {
        Some(path) => CalibConfig::load_json(path)?,
        None => CalibConfig::default(),
    };
    let cols = args.cols.unwrap_or(cfg.pattern.cols());
    let rows = args.rows.unwrap_or(cfg.pattern.rows());
    cfg.pattern = PatternGeometry::new(cols, rows)?;
    Ok(cfg)
}

fn run_calibrate(args: &CalibrateArgs) -> CliResult<()> {
    let cfg = load_config(&args.pattern)?;
    let mut ctl = AcquisitionController::from_config(&cfg, Arc::new(ReplayBackend::new()));
    ctl.load_files(&args.images)?;

    let mut found = 0usize;
    while ctl.can_detect() {
        match ctl.detect() {
            Ok(detection) if detection.is_detected() => found += 1,
            Ok(_) => {}
            // a view of a different size is skipped, the rest still count
            Err(AcquisitionError::Store(err)) => log::warn!("view skipped: {err}"),
            Err(err) => return Err(err.into()),
        }
    }
    log::info!("{found}/{} images usable", args.images.len());

    ctl.calibrate()?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_result_filename()));
    let record = ctl.save_result(&output)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn save_overlay(
    path: &Path,
    image: &image::DynamicImage,
    corners: &camcal::DetectedCorners,
) -> CliResult<()> {
    draw_corners(&image.to_rgb8(), corners).save(path)?;
    log::info!("overlay written to {}", path.display());
    Ok(())
}

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let cfg = load_config(&args.pattern)?;
    let image = image::open(&args.image)?;
    let detector = ChessboardDetector::new(cfg.detector);
    let corners = detector.detect(&image, cfg.pattern).ok_or_else(|| {
        format!(
            "no {} checkerboard found in {}",
            cfg.pattern,
            args.image.display()
        )
    })?;

    if let Some(path) = &args.overlay {
        save_overlay(path, &image, &corners)?;
    }
    let points: Vec<[f32; 2]> = corners
        .into_points()
        .into_iter()
        .map(|p| [p.x, p.y])
        .collect();
    let report = serde_json::json!({
        "pattern": cfg.pattern,
        "image_size": [image.width(), image.height()],
        "corners": points,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_log(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if camcal::init_with_level(level).is_err() {
        eprintln!("logger already initialised");
    }
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) {
    if cli.log_json {
        camcal::init_tracing(true);
    } else {
        init_log(cli.verbose);
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) {
    init_log(cli.verbose);
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let res = match &cli.command {
        Commands::Calibrate(args) => run_calibrate(args),
        Commands::Detect(args) => run_detect(args),
    };
    if let Err(err) = res {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
