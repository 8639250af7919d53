use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::telemetry::Telemetry;

/// Pixel-space bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
}

/// One recognized object of interest.
///
/// A target always carries the sequence number of the frame that produced it and a
/// copy of that frame's telemetry, so a record in the results log can be placed
/// without the frame itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub frame_seq: u64,
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub telemetry: Option<Telemetry>,
}

impl Target {
    /// Single-line textual record for the results log.
    pub fn to_record(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
