use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scangate_core::{Decision, FaceDetector, QualityGate, ReplayDetector};
use scangate_feedback::{
    BrightnessMeter, CaptureAction, Checklist, Config, DebouncedSink, FeedbackLoop,
};
use scangate_hw::{FrameSource, ImageSequenceSource, StillImageSource};
use serde::Serialize;
use std::path::{Path, PathBuf};

mod console;

use console::ConsoleSink;

#[derive(Parser)]
#[command(name = "scangate", about = "Face capture quality gate")]
struct Cli {
    /// TOML config file (SCANGATE_* environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess a single image once
    Check {
        /// Image file to assess
        image: PathBuf,
        /// Recorded detections (JSON, analysis-buffer coordinates); no face if omitted
        #[arg(short, long)]
        detections: Option<PathBuf>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the scan loop over a directory of frames
    Replay {
        /// Directory of image frames, played in file-name order
        dir: PathBuf,
        /// Recorded detections (JSON, one array per frame); no face if omitted
        #[arg(short, long)]
        detections: Option<PathBuf>,
        /// Stop after this many cycles (default: run until Ctrl-C)
        #[arg(short = 'n', long)]
        cycles: Option<u64>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
struct Report<'a> {
    image: &'a Path,
    original_width: u32,
    original_height: u32,
    capture: CaptureAction,
    checklist: Checklist,
    brightness: BrightnessMeter,
    decision: &'a Decision,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env().context("reading config from environment")?,
    };

    match cli.command {
        Commands::Check {
            image,
            detections,
            json,
        } => check(&config, &image, detections.as_deref(), json).await,
        Commands::Replay {
            dir,
            detections,
            cycles,
        } => replay(&config, dir, detections.as_deref(), cycles).await,
        Commands::Config => {
            print!("{}", config.to_toml().context("serializing config")?);
            Ok(())
        }
    }
}

fn load_detector(path: Option<&Path>) -> Result<ReplayDetector> {
    match path {
        Some(path) => ReplayDetector::load(path)
            .with_context(|| format!("loading detections from {}", path.display())),
        None => Ok(ReplayDetector::empty()),
    }
}

async fn check(config: &Config, image: &Path, detections: Option<&Path>, json: bool) -> Result<()> {
    let mut source = StillImageSource::new(image, config.analysis_width, config.analysis_height);
    source
        .open()
        .with_context(|| format!("opening {}", image.display()))?;
    let frame = source.capture().context("capturing frame")?;
    source.release();

    let mut detector = load_detector(detections)?;
    detector
        .initialize()
        .await
        .context("initializing detector")?;

    let gate = QualityGate::new(&config.thresholds);
    let decision = gate
        .assess(&mut detector, &frame.buffer, Some(frame.original_size()))
        .await;

    let report = Report {
        image,
        original_width: frame.original_width,
        original_height: frame.original_height,
        capture: CaptureAction::for_severity(decision.severity),
        checklist: Checklist::from_decision(&decision),
        brightness: BrightnessMeter::from_lighting(&decision.lighting),
        decision: &decision,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} ({}x{})",
        image.display(),
        report.original_width,
        report.original_height
    );
    println!(
        "  face       {:?}: {}",
        decision.face.status, decision.face.message
    );
    println!(
        "  lighting   {:?}: {} (mean {:.1}, std dev {:.1})",
        decision.lighting.status,
        decision.lighting.message,
        decision.lighting.mean_brightness(),
        decision.lighting.std_dev()
    );
    for hint in &decision.lighting.details {
        println!("             - {hint}");
    }
    println!(
        "  sharpness  {:?}: {} (score {:.1})",
        decision.sharpness.status, decision.sharpness.message, decision.sharpness.score
    );
    println!("  {}", console::checklist_line(&report.checklist));
    println!("  brightness {}", console::meter_bar(&report.brightness));
    println!(
        "{}: {} ({})",
        console::severity_label(&decision),
        decision.message,
        console::capture_label(report.capture)
    );
    Ok(())
}

async fn replay(
    config: &Config,
    dir: PathBuf,
    detections: Option<&Path>,
    cycles: Option<u64>,
) -> Result<()> {
    let source = ImageSequenceSource::new(dir, config.analysis_width, config.analysis_height);
    let detector = load_detector(detections)?;
    let sink = DebouncedSink::spawn(ConsoleSink::default(), config.debounce());

    let mut scan = FeedbackLoop::new(config, detector, source, sink);
    if let Err(e) = scan.start().await {
        // Let the sink print the failure before exiting.
        scan.into_sink().shutdown().await;
        return Err(e).context("starting scan loop");
    }

    let control = scan.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted; stopping scan loop");
            control.stop();
        }
    });

    let attempted = scan.run(cycles).await.context("running scan loop")?;
    let last = scan.last_decision().cloned();
    let emitted = scan.cycles();
    let capture = scan.capture_action();
    scan.into_sink().shutdown().await;

    println!("{attempted} cycles, {emitted} decisions");
    if let Some(decision) = last {
        println!(
            "last: {}: {} ({})",
            console::severity_label(&decision),
            decision.message,
            console::capture_label(capture)
        );
    }
    Ok(())
}
