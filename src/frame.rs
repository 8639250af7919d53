//! Frames flowing through the pipeline.
//!
//! - `Frame`: RGB8 pixels plus capture metadata and the detections found on it.
//!
//! A frame is owned by exactly one stage at a time. Sources build it, one
//! detection task mutates it, the output stage persists it and drops it.
//! Pixels are private; readers get a borrowed slice and nothing can swap the
//! payload after construction.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::detect::{BoundingBox, Target};
use crate::telemetry::Telemetry;

/// Outline colour used when annotating saved frames.
const ANNOTATION_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);

/// Outline thickness in pixels.
const ANNOTATION_THICKNESS: u32 = 2;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

pub struct Frame {
    /// Monotonic sequence number assigned by the source.
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    /// Packed RGB8, row-major. Never empty.
    pixels: Vec<u8>,
    pub captured_at: SystemTime,
    pub telemetry: Option<Telemetry>,
    /// Where the frame came from (file name, device), for logs.
    pub origin: Option<String>,
    targets: Vec<Target>,
}

impl Frame {
    /// Build a frame from packed RGB8 pixels.
    ///
    /// An empty payload is rejected here so a detection task can never receive one.
    pub fn new(seq: u64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if pixels.is_empty() || width == 0 || height == 0 {
            return Err(anyhow!("frame {} has an empty image payload", seq));
        }
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame {} payload is {} bytes, expected {} for {}x{} RGB8",
                seq,
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            seq,
            width,
            height,
            pixels,
            captured_at: SystemTime::now(),
            telemetry: None,
            origin: None,
            targets: Vec::new(),
        })
    }

    pub fn from_image(seq: u64, image: RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(seq, width, height, image.into_raw())
    }

    pub fn with_captured_at(mut self, captured_at: SystemTime) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Option<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// RGB value at (x, y). Caller keeps coordinates in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Record a detection on this frame. Detectors call this; order is preserved.
    pub fn add_target(&mut self, label: impl Into<String>, bbox: BoundingBox, confidence: f32) {
        self.targets.push(Target {
            frame_seq: self.seq,
            label: label.into(),
            bbox,
            confidence,
            telemetry: self.telemetry.clone(),
        });
    }

    /// File name used when the frame is persisted.
    pub fn file_name(&self) -> String {
        format!("frame_{:06}.jpg", self.seq)
    }

    /// Copy of the frame with every detection outlined.
    pub fn annotated(&self) -> Result<RgbImage> {
        let mut image = RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| anyhow!("frame {} pixel buffer does not match its size", self.seq))?;
        for target in &self.targets {
            draw_outline(&mut image, &target.bbox);
        }
        Ok(image)
    }

    /// Write the annotated frame into `dir` and return the file path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
        let path = dir.join(self.file_name());
        self.annotated()?
            .save(&path)
            .with_context(|| format!("failed to write frame {}", path.display()))?;
        Ok(path)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("seq", &self.seq)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("origin", &self.origin)
            .field("targets", &self.targets.len())
            .finish()
    }
}

fn draw_outline(image: &mut RgbImage, bbox: &BoundingBox) {
    let (width, height) = image.dimensions();
    if bbox.w == 0 || bbox.h == 0 || bbox.x >= width || bbox.y >= height {
        return;
    }
    let x1 = bbox.x.saturating_add(bbox.w - 1).min(width - 1);
    let y1 = bbox.y.saturating_add(bbox.h - 1).min(height - 1);
    for t in 0..ANNOTATION_THICKNESS {
        for x in bbox.x..=x1 {
            image.put_pixel(x, (bbox.y + t).min(y1), ANNOTATION_COLOUR);
            image.put_pixel(x, y1.saturating_sub(t).max(bbox.y), ANNOTATION_COLOUR);
        }
        for y in bbox.y..=y1 {
            image.put_pixel((bbox.x + t).min(x1), y, ANNOTATION_COLOUR);
            image.put_pixel(x1.saturating_sub(t).max(bbox.x), y, ANNOTATION_COLOUR);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
