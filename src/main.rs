use clap::Parser;
use emotion_tracker::classifier::OnnxEmotionClassifier;
use emotion_tracker::config::AppConfig;
use emotion_tracker::detector::OnnxFaceDetector;
use emotion_tracker::error::Result;
use emotion_tracker::monitor::EmotionMonitor;
use emotion_tracker::selector::FaceDetector;
use emotion_tracker::source::{DirectorySource, FrameSource};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Consecutive capture failures tolerated before giving up
const MAX_CAPTURE_FAILURES: u32 = 30;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of frames to replay instead of a camera
    #[arg(long)]
    input: Option<PathBuf>,

    /// Camera index (requires the `camera` feature)
    #[arg(long, default_value_t = 0)]
    camera: u32,

    /// Directory to write annotated frames into
    #[arg(long)]
    output: Option<PathBuf>,

    /// Configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Print the cameras the platform reports and exit
    #[arg(long)]
    list_cameras: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_config: bool,

    /// Also log to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Initializes logging to a file, and to stderr when verbose
fn init_logging(verbose: bool) -> Result<()> {
    let log_file = std::fs::File::create("emotion_tracker.log")?;

    let file_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);
    let console_layer = verbose.then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(())
}

fn open_source(args: &Args) -> Result<Box<dyn FrameSource>> {
    if let Some(dir) = &args.input {
        return Ok(Box::new(DirectorySource::open(dir)?));
    }

    #[cfg(feature = "camera")]
    {
        Ok(Box::new(emotion_tracker::camera::CameraSource::new(
            args.camera,
        )?))
    }

    #[cfg(not(feature = "camera"))]
    {
        Err(emotion_tracker::error::EmotionTrackerError::FrameSource(format!(
            "No --input directory given and camera {} is unavailable in this build",
            args.camera
        )))
    }
}

#[cfg(feature = "camera")]
fn list_cameras() -> Result<()> {
    for device in emotion_tracker::camera::CameraSource::list_devices()? {
        println!("{device}");
    }
    Ok(())
}

#[cfg(not(feature = "camera"))]
fn list_cameras() -> Result<()> {
    Err(emotion_tracker::error::EmotionTrackerError::FrameSource(
        "camera support is not compiled into this build".to_string(),
    ))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    if args.list_cameras {
        return list_cameras();
    }

    let config = AppConfig::load(&args.config)?;
    if args.write_config {
        config.save(&args.config)?;
        info!("Wrote configuration to {}", args.config.display());
        return Ok(());
    }

    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)?;
    }

    let mut source = open_source(&args)?;
    let mut detector = OnnxFaceDetector::new(
        &config.models.face_detector,
        config.models.detector_score_threshold,
    )?;
    let classifier = OnnxEmotionClassifier::new(&config.models.emotion_classifier)?;
    let mut monitor = EmotionMonitor::new(classifier, &config)?;

    let state = monitor.state();
    let mut changes = state.subscribe();

    let mut frame_index: u64 = 0;
    let mut capture_failures = 0;
    loop {
        if args.max_frames.is_some_and(|max| frame_index >= max) {
            break;
        }

        let mut frame = match source.next_frame() {
            Ok(Some(frame)) => {
                capture_failures = 0;
                frame
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to grab frame: {}", e);
                capture_failures += 1;
                if capture_failures >= MAX_CAPTURE_FAILURES {
                    error!("Giving up after {} failed captures", capture_failures);
                    break;
                }
                continue;
            }
        };
        if config.capture.mirror {
            image::imageops::flip_horizontal_in_place(&mut frame);
        }

        let faces = detector.detect(&frame).unwrap_or_else(|e| {
            error!("Face detection failed: {}", e);
            Vec::new()
        });
        monitor.process_frame(&mut frame, &faces);

        while let Ok(change) = changes.try_recv() {
            println!("frame {frame_index}: {}", change.label);
        }

        if let Some(dir) = &args.output {
            let path = dir.join(format!("frame_{frame_index:06}.png"));
            if let Err(e) = frame.save(&path) {
                warn!("Failed to write {}: {}", path.display(), e);
            }
        }
        frame_index += 1;
    }

    // Give the worker a moment to publish the last submission
    std::thread::sleep(config.pipeline.join_timeout() / 4);
    monitor.publish_latest();
    monitor.stop();

    let snapshot = state.read();
    let stats = monitor.stats();
    info!(
        frames = frame_index,
        submitted = stats.submitted,
        dropped = stats.dropped,
        classified = stats.classified,
        failed = stats.failed,
        "Finished"
    );
    println!(
        "final emotion: {} ({:.1}%)",
        snapshot.label,
        snapshot.label_confidence()
    );

    Ok(())
}
