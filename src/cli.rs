//! Command-line entry point: flag parsing, startup wiring, and the console loop.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::FramewatchConfig;
use crate::console::Console;
use crate::detect::EngineRegistry;
use crate::ingest::{
    open_capture, CaptureDevice, DirectorySource, FrameSource, SyntheticConfig, SyntheticSource,
};
use crate::logging;
use crate::pipeline::Pipeline;
use crate::sink::{AnnotatedFramePersister, FileResultsSink};
use crate::telemetry::{FileMetadataSource, MetadataSource, NetworkMetadataSource};

#[derive(Parser, Debug)]
#[command(
    name = "framewatch",
    author,
    version,
    about = "Fetch frames, run detection on a worker pool, and log what was found"
)]
pub struct Args {
    /// TOML configuration file.
    #[arg(long, env = "FRAMEWATCH_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory of still images to process.
    #[arg(short = 'i', long, value_name = "DIR")]
    pub images: Option<PathBuf>,

    /// Video device index.
    #[arg(short = 'v', long, value_name = "INDEX")]
    pub video: Option<u32>,

    /// Read from the capture card.
    #[arg(short = 'd', long)]
    pub capture_card: bool,

    /// Generate this many synthetic frames.
    #[arg(long, value_name = "FRAMES")]
    pub synthetic: Option<u64>,

    /// Telemetry log file.
    #[arg(short = 't', long, value_name = "PATH")]
    pub telemetry: Option<PathBuf>,

    /// Telemetry feed host.
    #[arg(short = 'a', long)]
    pub addr: Option<String>,

    /// Telemetry feed port.
    #[arg(short = 'p', long)]
    pub port: Option<String>,

    /// Output directory for the detection log and saved frames.
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Save annotated copies of frames with detections.
    #[arg(long)]
    pub intermediate: bool,

    /// Detection engine name.
    #[arg(long)]
    pub detector: Option<String>,

    /// Detection worker threads.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Initial log level (off, error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSelection {
    Images(PathBuf),
    Video(u32),
    CaptureCard,
    Synthetic(u64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelemetrySelection {
    File(PathBuf),
    Network { addr: String, port: String },
}

impl Args {
    /// The single frame source named on the command line.
    pub fn source(&self) -> Result<SourceSelection> {
        let mut selected = Vec::new();
        if let Some(dir) = &self.images {
            selected.push(SourceSelection::Images(dir.clone()));
        }
        if let Some(index) = self.video {
            selected.push(SourceSelection::Video(index));
        }
        if self.capture_card {
            selected.push(SourceSelection::CaptureCard);
        }
        if let Some(frames) = self.synthetic {
            selected.push(SourceSelection::Synthetic(frames));
        }
        match selected.len() {
            0 => bail!("You must specify an image source (--images, --video, --capture-card or --synthetic)"),
            1 => Ok(selected.remove(0)),
            _ => bail!("You can only specify one image source at a time"),
        }
    }

    /// The single telemetry source: a log file, or a feed given by host and port.
    pub fn telemetry_source(&self) -> Result<TelemetrySelection> {
        match (&self.telemetry, &self.addr, &self.port) {
            (None, None, None) => {
                bail!("You must specify a telemetry file (--telemetry), or --addr and --port")
            }
            (Some(path), None, None) => Ok(TelemetrySelection::File(path.clone())),
            (None, Some(addr), Some(port)) => Ok(TelemetrySelection::Network {
                addr: addr.clone(),
                port: port.clone(),
            }),
            (Some(_), _, _) => bail!("Use either --telemetry or --addr/--port, not both"),
            (None, _, _) => bail!("A telemetry feed needs both --addr and --port"),
        }
    }

    /// Layer command-line flags over the loaded configuration.
    pub fn apply_to(&self, config: &mut FramewatchConfig) -> Result<()> {
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        if self.intermediate {
            config.intermediate = true;
        }
        if let Some(detector) = &self.detector {
            config.detector = detector.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(level) = &self.log_level {
            config.log_level = logging::parse_level(level)?;
        }
        config.validate()
    }
}

pub fn run() -> Result<()> {
    run_with(Args::parse())
}

pub fn run_with(args: Args) -> Result<()> {
    let source = args.source()?;
    let telemetry = args.telemetry_source()?;
    let mut config = FramewatchConfig::load_from(args.config.as_deref())?;
    args.apply_to(&mut config)?;

    logging::init(config.log_level);

    let metadata = open_metadata(telemetry)?;
    let source = open_source(source, Some(metadata))?;
    let engine = EngineRegistry::with_builtin().select(&config.detector)?;
    engine
        .warm_up()
        .with_context(|| format!("detector {} failed to warm up", engine.name()))?;

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.output_dir.display()
        )
    })?;
    let sink = FileResultsSink::new(config.results_path());
    log::info!("writing detections to {}", sink.path().display());

    let pipeline = Pipeline::new(
        config.pipeline_settings(),
        source,
        engine,
        Arc::new(sink),
        Arc::new(AnnotatedFramePersister),
    );

    let interrupted = pipeline.clone();
    ctrlc::set_handler(move || {
        if interrupted.stop_ingestion() {
            log::warn!("interrupted; finishing queued frames");
        }
    })
    .context("failed to install Ctrl-C handler")?;

    let console = Console::new(pipeline.clone())?;
    console.run(std::io::stdin().lock(), std::io::stdout())?;

    pipeline.shutdown();
    Ok(())
}

fn open_metadata(selection: TelemetrySelection) -> Result<Arc<dyn MetadataSource>> {
    match selection {
        TelemetrySelection::File(path) => Ok(Arc::new(FileMetadataSource::open(&path)?)),
        TelemetrySelection::Network { addr, port } => {
            Ok(Arc::new(NetworkMetadataSource::connect(&addr, &port)?))
        }
    }
}

fn open_source(
    selection: SourceSelection,
    metadata: Option<Arc<dyn MetadataSource>>,
) -> Result<Box<dyn FrameSource>> {
    match selection {
        SourceSelection::Images(dir) => Ok(Box::new(DirectorySource::open(&dir, metadata)?)),
        SourceSelection::Synthetic(frames) => Ok(Box::new(SyntheticSource::new(
            SyntheticConfig {
                frames,
                ..SyntheticConfig::default()
            },
            metadata,
        ))),
        SourceSelection::Video(index) => open_capture(CaptureDevice::Video(index)),
        SourceSelection::CaptureCard => open_capture(CaptureDevice::CaptureCard),
    }
}
