use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use facegate_core::capture::domain::source_descriptor::SourceDescriptor;
use facegate_core::capture::domain::video_source::{VideoSource, VideoSourceFactory};
use facegate_core::capture::frame_source::{FrameSource, FrameSourceConfig, StreamMode};
use facegate_core::capture::infrastructure::ffmpeg_source::FfmpegSource;
use facegate_core::capture::replay_catalog::{utc_offset_hours, ProcessedLedger, ReplayCatalog};
use facegate_core::detection::domain::face_detector::FaceDetector;
use facegate_core::detection::face_localizer::LocalizerSettings;
use facegate_core::detection::infrastructure::onnx_ssd_detector::OnnxSsdDetector;
use facegate_core::detection::infrastructure::second_pass_refiner::SecondPassRefiner;
use facegate_core::embedding::infrastructure::onnx_embedding_extractor::OnnxEmbeddingExtractor;
use facegate_core::pipeline::infrastructure::threaded_pipeline;
use facegate_core::pipeline::pipeline_config::{PipelineComponents, PipelineConfig};
use facegate_core::shared::constants::{
    DATA_DIR_NAME, DEFAULT_FRAME_INTERVAL, DEFAULT_MAX_STREAMS, DEFAULT_QUEUE_SIZE,
    DEFAULT_RECORDING_UTC_OFFSET_HOURS, PROCESSED_LEDGER_FILENAME,
};
use facegate_core::sinks::domain::door_unlocker::DoorUnlocker;
use facegate_core::sinks::domain::identity_store::IdentityStore;
use facegate_core::sinks::door_dispatcher::default_doors;
use facegate_core::sinks::infrastructure::http_door_unlocker::HttpDoorUnlocker;
use facegate_core::sinks::infrastructure::json_file_store::JsonFileStore;
use facegate_core::sinks::infrastructure::logging_door_unlocker::LoggingDoorUnlocker;
use facegate_core::tracking::track_aggregator::TrackerSettings;

/// Recognize people across camera streams and open doors for known faces.
#[derive(Parser, Debug)]
#[command(name = "facegate")]
struct Cli {
    /// Camera to watch, as NAME=SOURCE (RTSP/HTTP URL or video file). Repeatable.
    /// With --replay-dir, only the names are used to select recordings.
    #[arg(long = "camera", value_name = "NAME=SOURCE", value_parser = parse_camera)]
    cameras: Vec<(String, String)>,

    /// Replay recordings named <Camera>_01_<YYYYMMDDhhmmss>.mp4 from this directory.
    #[arg(long)]
    replay_dir: Option<PathBuf>,

    /// UTC offset, in hours, of the timestamps in recording names.
    #[arg(
        long,
        default_value_t = DEFAULT_RECORDING_UTC_OFFSET_HOURS,
        allow_negative_numbers = true
    )]
    utc_offset_hours: i32,

    /// Delete each recording once it has been replayed.
    #[arg(long)]
    delete_after_replay: bool,

    /// Keep every Nth decoded frame.
    #[arg(long, default_value_t = DEFAULT_FRAME_INTERVAL)]
    frame_interval: usize,

    /// Maximum number of concurrently captured streams.
    #[arg(long, default_value_t = DEFAULT_MAX_STREAMS)]
    max_streams: usize,

    /// Capacity of each queue between pipeline stages.
    #[arg(long, default_value_t = DEFAULT_QUEUE_SIZE)]
    queue_size: usize,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    confidence: f32,

    /// Drop detections without a clear frontal face.
    #[arg(long)]
    require_frontal_face: bool,

    /// Save every face crop to this directory.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Where people, sightings, face images and the replay ledger are kept.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Do not store people or sightings.
    #[arg(long)]
    no_persist: bool,

    /// Door unlock URL template with {door_id} and {identity} placeholders.
    #[arg(long, env = "FACEGATE_UNLOCK_URL")]
    unlock_url: Option<String>,

    /// Map a camera to a door id, as NAME=ID. Repeatable; overrides defaults.
    #[arg(long = "door", value_name = "NAME=ID", value_parser = parse_door)]
    doors: Vec<(String, u32)>,

    /// SSD face detector ONNX model.
    #[arg(long)]
    detector_model: PathBuf,

    /// Face embedding ONNX model.
    #[arg(long)]
    embedding_model: PathBuf,

    /// Close a track once its camera has gone this long without seeing it.
    #[arg(long, default_value = "100")]
    track_timeout_ms: i64,

    /// Discard tracks with fewer detections than this.
    #[arg(long, default_value = "1")]
    valid_track_length: usize,

    /// Faces closer than this embedding distance are the same person.
    #[arg(long, default_value = "0.6")]
    match_threshold: f32,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => dirs::data_dir()
            .map(|d| d.join(DATA_DIR_NAME))
            .ok_or("could not determine data directory, pass --data-dir")?,
    };

    let config = build_config(&cli);
    let components = build_components(&cli, &data_dir)?;
    let pipeline = threaded_pipeline::start(config, components)?;

    let factory: Arc<dyn VideoSourceFactory> =
        Arc::new(|| -> Box<dyn VideoSource> { Box::new(FfmpegSource::new()) });
    let source_config = FrameSourceConfig {
        frame_interval: cli.frame_interval,
        max_streams: cli.max_streams,
        ..FrameSourceConfig::default()
    };
    let mut source = FrameSource::new(source_config, factory, pipeline.input());

    let capture_result = match &cli.replay_dir {
        Some(dir) => run_replay(&cli, dir, &data_dir, &mut source),
        None => run_cameras(&cli, &mut source),
    };
    drop(source);

    log::info!("Draining pipeline");
    let report = pipeline.join()?;
    report.log_summary();
    capture_result
}

/// Starts one capture thread per camera and waits for all of them.
fn run_cameras(cli: &Cli, source: &mut FrameSource) -> Result<(), Box<dyn std::error::Error>> {
    for (name, location) in &cli.cameras {
        let descriptor = SourceDescriptor::parse(location);
        log::info!("Watching {name} at {descriptor}");
        source.open_stream(name, descriptor, None, false, StreamMode::Threaded)?;
    }
    for report in source.join()? {
        log::info!(
            "{}: decoded {} frames, emitted {}, restarted {} times",
            report.camera,
            report.frames_decoded,
            report.frames_emitted,
            report.restarts
        );
    }
    Ok(())
}

/// Replays unprocessed recordings one at a time, oldest name first.
fn run_replay(
    cli: &Cli,
    dir: &Path,
    data_dir: &Path,
    source: &mut FrameSource,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;
    let mut ledger = ProcessedLedger::open(&data_dir.join(PROCESSED_LEDGER_FILENAME))?;

    let mut catalog = ReplayCatalog::new(utc_offset_hours(cli.utc_offset_hours)?);
    if !cli.cameras.is_empty() {
        catalog = catalog.with_allowed_cameras(cli.cameras.iter().map(|(name, _)| name.clone()));
    }
    let recordings = catalog.scan(dir, &ledger)?;
    log::info!(
        "{} recordings to replay ({} already processed)",
        recordings.len(),
        ledger.len()
    );

    for recording in recordings {
        log::info!("Replaying {}", recording.key);
        let result = source.open_stream(
            &recording.camera_name,
            SourceDescriptor::File(recording.path.clone()),
            Some(recording.start_time_ms),
            cli.delete_after_replay,
            StreamMode::Inline,
        );
        match result {
            Ok(()) => ledger.mark(&recording.key)?,
            Err(e) => log::error!("Skipping {}: {e}", recording.key),
        }
    }
    source.join()?;
    Ok(())
}

fn build_config(cli: &Cli) -> PipelineConfig {
    let mut doors = default_doors();
    doors.extend(cli.doors.iter().cloned());

    PipelineConfig {
        queue_size: cli.queue_size,
        localizer: LocalizerSettings {
            confidence: cli.confidence,
            ..LocalizerSettings::default()
        },
        tracker: TrackerSettings {
            timeout_ms: cli.track_timeout_ms,
            valid_track_length: cli.valid_track_length,
        },
        match_threshold: cli.match_threshold,
        doors,
        preview_dir: cli.preview.clone(),
        ..PipelineConfig::default()
    }
}

fn build_components(
    cli: &Cli,
    data_dir: &Path,
) -> Result<PipelineComponents, Box<dyn std::error::Error>> {
    log::info!("Loading detector: {}", cli.detector_model.display());
    let detector: Box<dyn FaceDetector> = Box::new(OnnxSsdDetector::new(&cli.detector_model)?);
    log::info!("Loading embedding model: {}", cli.embedding_model.display());
    let extractor = Box::new(OnnxEmbeddingExtractor::new(&cli.embedding_model)?);

    let unlocker: Box<dyn DoorUnlocker> = match &cli.unlock_url {
        Some(url) => Box::new(HttpDoorUnlocker::new(url.as_str())?),
        None => Box::new(LoggingDoorUnlocker),
    };

    let mut components = PipelineComponents::new(detector, extractor, unlocker);

    if cli.require_frontal_face {
        let second_pass = Box::new(OnnxSsdDetector::new(&cli.detector_model)?);
        components =
            components.with_refiner(Box::new(SecondPassRefiner::new(second_pass, cli.confidence)));
    }

    if !cli.no_persist {
        let store = JsonFileStore::open(data_dir)?;
        let known: Vec<_> = store
            .load_people()?
            .into_iter()
            .map(|person| person.into_identity_entry())
            .collect();
        log::info!(
            "Loaded {} known people from {}",
            known.len(),
            data_dir.display()
        );
        components = components
            .with_store(Box::new(store))
            .with_known_identities(known);
    }

    Ok(components)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.cameras.is_empty() && cli.replay_dir.is_none() {
        return Err("Nothing to watch: pass --camera or --replay-dir".into());
    }
    if let Some(dir) = &cli.replay_dir {
        if !dir.is_dir() {
            return Err(format!("Replay directory not found: {}", dir.display()).into());
        }
    }
    for model in [&cli.detector_model, &cli.embedding_model] {
        if !model.is_file() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if cli.frame_interval == 0 {
        return Err("Frame interval must be at least 1".into());
    }
    if cli.max_streams == 0 {
        return Err("Max streams must be at least 1".into());
    }
    if cli.queue_size == 0 {
        return Err("Queue size must be at least 1".into());
    }
    if cli.track_timeout_ms < 0 {
        return Err(format!(
            "Track timeout must not be negative, got {}",
            cli.track_timeout_ms
        )
        .into());
    }
    if cli.valid_track_length == 0 {
        return Err("Valid track length must be at least 1".into());
    }
    if cli.match_threshold <= 0.0 {
        return Err(format!(
            "Match threshold must be positive, got {}",
            cli.match_threshold
        )
        .into());
    }
    utc_offset_hours(cli.utc_offset_hours)?;
    Ok(())
}

fn parse_camera(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, source)) if !name.trim().is_empty() && !source.trim().is_empty() => {
            Ok((name.trim().to_string(), source.trim().to_string()))
        }
        _ => Err(format!("expected NAME=SOURCE, got '{s}'")),
    }
}

fn parse_door(s: &str) -> Result<(String, u32), String> {
    let (name, id) = s
        .split_once('=')
        .filter(|(name, _)| !name.trim().is_empty())
        .ok_or_else(|| format!("expected NAME=ID, got '{s}'"))?;
    let id = id
        .trim()
        .parse()
        .map_err(|_| format!("door id must be a non-negative integer, got '{id}'"))?;
    Ok((name.trim().to_string(), id))
}
