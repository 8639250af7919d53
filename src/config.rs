use anyhow::{anyhow, Result};
use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging;
use crate::pipeline::{
    hardware_concurrency, PipelineSettings, DEFAULT_INITIAL_LATENCY_MS, DEFAULT_POLL_INTERVAL,
    INGEST_QUEUE_CAPACITY,
};

const DEFAULT_OUTPUT_DIR: &str = "./";
const DEFAULT_RESULTS_FILE: &str = "detections.jsonl";
const DEFAULT_DETECTOR: &str = "color";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FramewatchConfigFile {
    output_dir: Option<PathBuf>,
    results_file: Option<String>,
    intermediate: Option<bool>,
    detector: Option<String>,
    log_level: Option<String>,
    pipeline: Option<PipelineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    workers: Option<usize>,
    ingest_capacity: Option<usize>,
    poll_interval_ms: Option<u64>,
    initial_latency_ms: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FramewatchConfig {
    pub output_dir: PathBuf,
    pub results_file: String,
    pub intermediate: bool,
    pub detector: String,
    pub log_level: LevelFilter,
    pub workers: usize,
    pub ingest_capacity: usize,
    pub poll_interval: Duration,
    pub initial_latency_ms: f64,
}

impl Default for FramewatchConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            results_file: DEFAULT_RESULTS_FILE.to_string(),
            intermediate: false,
            detector: DEFAULT_DETECTOR.to_string(),
            log_level: logging::default_level(),
            workers: hardware_concurrency(),
            ingest_capacity: INGEST_QUEUE_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            initial_latency_ms: DEFAULT_INITIAL_LATENCY_MS,
        }
    }
}

impl FramewatchConfig {
    /// Load from the file named by `FRAMEWATCH_CONFIG` (if set), then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FRAMEWATCH_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit config file (if any), then environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => FramewatchConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FramewatchConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let log_level = match file.log_level.as_deref() {
            Some(level) => logging::parse_level(level)?,
            None => defaults.log_level,
        };
        let pipeline = file.pipeline.unwrap_or_default();
        Ok(Self {
            output_dir: file.output_dir.unwrap_or(defaults.output_dir),
            results_file: file.results_file.unwrap_or(defaults.results_file),
            intermediate: file.intermediate.unwrap_or(defaults.intermediate),
            detector: file.detector.unwrap_or(defaults.detector),
            log_level,
            workers: pipeline.workers.unwrap_or(defaults.workers),
            ingest_capacity: pipeline.ingest_capacity.unwrap_or(defaults.ingest_capacity),
            poll_interval: pipeline
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            initial_latency_ms: pipeline
                .initial_latency_ms
                .unwrap_or(defaults.initial_latency_ms),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("FRAMEWATCH_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(file) = std::env::var("FRAMEWATCH_RESULTS_FILE") {
            if !file.trim().is_empty() {
                self.results_file = file;
            }
        }
        if let Ok(detector) = std::env::var("FRAMEWATCH_DETECTOR") {
            if !detector.trim().is_empty() {
                self.detector = detector;
            }
        }
        if let Ok(level) = std::env::var("FRAMEWATCH_LOG_LEVEL") {
            self.log_level = logging::parse_level(&level)?;
        }
        if let Ok(workers) = std::env::var("FRAMEWATCH_WORKERS") {
            self.workers = workers
                .trim()
                .parse()
                .map_err(|_| anyhow!("FRAMEWATCH_WORKERS must be a positive integer"))?;
        }
        if let Ok(flag) = std::env::var("FRAMEWATCH_INTERMEDIATE") {
            self.intermediate = parse_flag(&flag)
                .ok_or_else(|| anyhow!("FRAMEWATCH_INTERMEDIATE must be true or false"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(anyhow!("workers must be greater than zero"));
        }
        if self.ingest_capacity == 0 {
            return Err(anyhow!("ingest_capacity must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll_interval_ms must be greater than zero"));
        }
        if !self.initial_latency_ms.is_finite() || self.initial_latency_ms < 0.0 {
            return Err(anyhow!("initial_latency_ms must be a non-negative number"));
        }
        if self.results_file.trim().is_empty() {
            return Err(anyhow!("results_file must not be empty"));
        }
        Ok(())
    }

    /// Full path of the detection log.
    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join(&self.results_file)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            output_dir: self.output_dir.clone(),
            intermediate: self.intermediate,
            ingest_capacity: self.ingest_capacity,
            poll_interval: self.poll_interval,
            initial_latency_ms: self.initial_latency_ms,
            workers: self.workers,
        }
    }
}

fn read_config_file(path: &Path) -> Result<FramewatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
