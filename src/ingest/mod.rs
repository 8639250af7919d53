//! Frame ingestion sources.
//!
//! This module provides different sources for frames:
//! - Image directories (`DirectorySource`)
//! - Generated frames for demos and tests (`SyntheticSource`)
//! - Video devices and capture cards (`open_capture`), when the build supports them
//!
//! All sources produce `Frame` instances that flow into the ingestion queue.
//! A source is responsible for:
//! - Decoding to packed RGB8
//! - Attaching telemetry at construction time
//! - Reporting end-of-stream as `Ok(None)`, repeatedly if asked again
//!
//! Undecodable inputs are the source's problem: skip them, or return an error
//! when the stream cannot continue at all.

use anyhow::Result;

pub mod device;
pub mod directory;
pub mod synthetic;

pub use device::{open_capture, CaptureDevice};
pub use directory::DirectorySource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

use crate::frame::Frame;

/// A pull-based producer of frames.
pub trait FrameSource: Send {
    /// Source description for logs.
    fn name(&self) -> String;

    /// Next frame, or `Ok(None)` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}
