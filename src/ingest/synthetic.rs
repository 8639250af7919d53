//! Synthetic frame source.
//!
//! Generates a finite run of frames without touching disk. Every third frame
//! carries a saturated square that moves across the scene, so the colour
//! engine has something to find.

use anyhow::Result;
use std::sync::Arc;
use std::time::SystemTime;

use super::FrameSource;
use crate::frame::Frame;
use crate::telemetry::MetadataSource;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Frames to produce before end-of-stream.
    pub frames: u64,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            frames: 30,
            width: 320,
            height: 240,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    metadata: Option<Arc<dyn MetadataSource>>,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig, metadata: Option<Arc<dyn MetadataSource>>) -> Self {
        Self {
            config,
            metadata,
            frame_count: 0,
        }
    }

    /// Frames produced so far.
    pub fn frames_produced(&self) -> u64 {
        self.frame_count
    }

    fn generate_pixels(&self, seq: u64) -> Vec<u8> {
        let (width, height) = (self.config.width, self.config.height);
        let mut pixels = vec![0u8; (width * height * 3) as usize];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            // Low-saturation gradient background.
            let v = (80 + (i as u64 + seq) % 40) as u8;
            px.copy_from_slice(&[v, v, v.saturating_add(8)]);
        }
        if seq % 3 == 0 {
            let side = (width.min(height) / 4).max(1);
            let span = width.saturating_sub(side).max(1);
            let x0 = ((seq * 17) % span as u64) as u32;
            let y0 = (height - side) / 2;
            for y in y0..y0 + side {
                for x in x0..x0 + side {
                    let idx = ((y * width + x) * 3) as usize;
                    pixels[idx..idx + 3].copy_from_slice(&[240, 30, 30]);
                }
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> String {
        format!("synthetic:{}", self.config.frames)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.config.frames {
            return Ok(None);
        }
        self.frame_count += 1;
        let seq = self.frame_count;
        let captured_at = SystemTime::now();
        let telemetry = self
            .metadata
            .as_ref()
            .and_then(|source| source.metadata_at(captured_at));
        let frame = Frame::new(
            seq,
            self.config.width,
            self.config.height,
            self.generate_pixels(seq),
        )?
        .with_captured_at(captured_at)
        .with_telemetry(telemetry)
        .with_origin(format!("synthetic-{}", seq));
        Ok(Some(frame))
    }
}
