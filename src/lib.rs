//! framewatch
//!
//! Concurrent frame acquisition and detection pipeline driven from an
//! interactive operator console.
//!
//! # Module Structure
//!
//! - `frame`: Frame type, validation, and annotated persistence
//! - `ingest`: Frame sources (image directories, synthetic frames, capture devices)
//! - `telemetry`: Metadata sources correlated with frames at capture time
//! - `detect`: Detection engines and the engine registry
//! - `pipeline`: Queues, rate estimation, scheduler, and the stage loops
//! - `sink`: Detection log and frame persistence
//! - `console`: Operator command table and dispatcher
//! - `config`, `logging`, `cli`: Startup wiring

pub mod cli;
pub mod config;
pub mod console;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod sink;
pub mod telemetry;

pub use config::FramewatchConfig;
pub use console::{CommandTable, Console};
pub use detect::{BoundingBox, DetectionEngine, EngineRegistry, Target};
pub use frame::Frame;
pub use ingest::FrameSource;
pub use pipeline::{Pipeline, PipelineSettings, PipelineState, PipelineStatus};
pub use sink::{FramePersister, ResultsSink};
pub use telemetry::{MetadataSource, Telemetry};
