//! Live capture sources (video devices, capture cards).
//!
//! This build ships no capture backend. Selecting one is a configuration
//! error reported at startup, before any pipeline thread runs.

use anyhow::{anyhow, Result};
use std::fmt;

use super::FrameSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureDevice {
    /// Video device by index (e.g. `/dev/video0` is 0).
    Video(u32),
    /// Dedicated capture card.
    CaptureCard,
}

impl fmt::Display for CaptureDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureDevice::Video(index) => write!(f, "video device {}", index),
            CaptureDevice::CaptureCard => write!(f, "capture card"),
        }
    }
}

/// Open a live capture source.
pub fn open_capture(device: CaptureDevice) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "{} ingestion is not supported by this build; use --images or --synthetic",
        device
    ))
}
