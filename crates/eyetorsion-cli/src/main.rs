//! Command-line front end: pupil, iris and torsion tracking over image sequences.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use eyetorsion::{
    CalibrationReference, Eye, EyeData, EyeTracker, EyeTrackingSettings, ImageFrame,
    ProcessFrameResult,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "eyetorsion")]
#[command(about = "Track pupil, iris, eyelids and ocular torsion in eye images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process an image sequence and write per-frame results.
    Track(CliTrackArgs),

    /// Build a calibration file (eye model + reference) from one image.
    Calibrate(CliCalibrateArgs),

    /// Print the default settings as JSON.
    DefaultSettings,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EyeArg {
    Left,
    Right,
}

impl EyeArg {
    fn to_core(self) -> Eye {
        match self {
            EyeArg::Left => Eye::Left,
            EyeArg::Right => Eye::Right,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CommonArgs {
    /// Settings JSON; fields left out keep their defaults.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Which eye the images show.
    #[arg(long, value_enum, default_value_t = EyeArg::Left)]
    eye: EyeArg,

    /// Frame rate used to derive timestamps.
    #[arg(long, default_value = "60.0")]
    fps: f64,
}

#[derive(Debug, Clone, Args)]
struct CliTrackArgs {
    /// Input images, in frame order.
    #[arg(long, num_args = 1.., required = true)]
    images: Vec<PathBuf>,

    /// Path to write per-frame results (JSON array).
    #[arg(long)]
    out: PathBuf,

    /// Existing calibration file. Without it the eye model and reference
    /// are captured from the first frame.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Write the calibration used for tracking to this path.
    #[arg(long)]
    save_calibration: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Debug, Clone, Args)]
struct CliCalibrateArgs {
    /// Reference image.
    #[arg(long)]
    image: PathBuf,

    /// Path to write the calibration (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Also write the reference iris strip as a PNG.
    #[arg(long)]
    strip_png: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track(args) => run_track(&args),
        Commands::Calibrate(args) => run_calibrate(&args),
        Commands::DefaultSettings => run_default_settings(),
    }
}

fn load_settings(path: Option<&Path>) -> CliResult<EyeTrackingSettings> {
    match path {
        Some(p) => {
            tracing::info!("Loading settings: {}", p.display());
            Ok(EyeTrackingSettings::from_json_file(p)?)
        }
        None => Ok(EyeTrackingSettings::default()),
    }
}

fn load_frame(path: &Path, frame_number: u64, common: &CommonArgs) -> CliResult<ImageFrame> {
    let img = image::open(path).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", path.display(), e).into()
    })?;
    let timestamp = frame_number as f64 / common.fps.max(f64::EPSILON);
    Ok(ImageFrame::new(
        img.to_luma8(),
        frame_number,
        timestamp,
        common.eye.to_core(),
    ))
}

/// Eye model from the frame's pupil, then the reference from the same frame.
fn calibrate_from_frame(
    tracker: &mut EyeTracker,
    frame: &ImageFrame,
) -> CliResult<(CalibrationReference, EyeData)> {
    let mut calibration = CalibrationReference::new(frame.eye);
    let model = tracker
        .eye_model_from_frame(frame)?
        .ok_or_else(|| -> CliError { "no pupil found in the calibration frame".into() })?;
    calibration.set_eye_model(model)?;
    let (data, state) = tracker.capture_reference(frame, &mut calibration)?;
    tracing::info!(
        "Calibration: globe center=({:.1}, {:.1}) radius={:.1}px, coverage={:.2}, state={:?}",
        model.center[0],
        model.center[1],
        model.radius,
        data.data_quality,
        state
    );
    Ok((calibration, data))
}

// ── track ──────────────────────────────────────────────────────────────

fn run_track(args: &CliTrackArgs) -> CliResult<()> {
    let settings = load_settings(args.common.settings.as_deref())?;
    let mut tracker = EyeTracker::new(settings)?;

    let first = load_frame(&args.images[0], 0, &args.common)?;
    let calibration = match &args.calibration {
        Some(path) => {
            tracing::info!("Loading calibration: {}", path.display());
            CalibrationReference::load_json(path)?
        }
        None => calibrate_from_frame(&mut tracker, &first)?.0,
    };
    if let Some(path) = &args.save_calibration {
        calibration.save_json(path)?;
        tracing::info!("Calibration written to {}", path.display());
    }

    let mut results = Vec::with_capacity(args.images.len());
    let mut n_good = 0usize;
    for (i, path) in args.images.iter().enumerate() {
        let frame = if i == 0 {
            first.clone()
        } else {
            load_frame(path, i as u64, &args.common)?
        };
        let data = tracker.process(&frame, &calibration)?;
        if data.status == ProcessFrameResult::Good {
            n_good += 1;
        }
        tracing::debug!(
            "{}: status={:?} pupil=({:.2}, {:.2}) torsion={:.2}deg quality={:.3}",
            path.display(),
            data.status,
            data.pupil.cx,
            data.pupil.cy,
            data.torsion_deg,
            data.data_quality
        );
        results.push(data);
    }
    tracing::info!("Processed {} frames ({} good)", results.len(), n_good);

    let json = serde_json::to_string_pretty(&results)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Results written to {}", args.out.display());
    Ok(())
}

// ── calibrate ──────────────────────────────────────────────────────────

fn run_calibrate(args: &CliCalibrateArgs) -> CliResult<()> {
    let settings = load_settings(args.common.settings.as_deref())?;
    let mut tracker = EyeTracker::new(settings)?;
    let frame = load_frame(&args.image, 0, &args.common)?;
    let (calibration, data) = calibrate_from_frame(&mut tracker, &frame)?;
    if !calibration.is_ready() {
        tracing::warn!(
            "Reference covers too little of the iris (state {:?}); torsion will be refused",
            calibration.state()
        );
    }
    calibration.save_json(&args.out)?;
    tracing::info!("Calibration written to {}", args.out.display());

    if let Some(path) = &args.strip_png {
        match data.torsion_image() {
            Some(img) => {
                img.save(path)?;
                tracing::info!("Reference strip written to {}", path.display());
            }
            None => tracing::warn!("No reference strip to write"),
        }
    }
    Ok(())
}

// ── default-settings ───────────────────────────────────────────────────

fn run_default_settings() -> CliResult<()> {
    println!("{}", EyeTrackingSettings::default().to_json_string()?);
    Ok(())
}
