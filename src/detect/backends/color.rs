use anyhow::Result;

use crate::detect::backend::DetectionEngine;
use crate::detect::result::BoundingBox;
use crate::frame::Frame;

/// Tuning for `ColorBlobEngine`.
#[derive(Clone, Debug)]
pub struct ColorBlobConfig {
    /// Side of a sampling cell in pixels.
    pub cell_size: u32,
    /// Minimum `max(r,g,b) - min(r,g,b)` for a cell to count as saturated.
    pub min_saturation: u8,
    /// Minimum `max(r,g,b)` for a cell to count as saturated.
    pub min_brightness: u8,
    /// Components smaller than this many cells are ignored.
    pub min_cells: usize,
}

impl Default for ColorBlobConfig {
    fn default() -> Self {
        Self {
            cell_size: 4,
            min_saturation: 100,
            min_brightness: 120,
            min_cells: 4,
        }
    }
}

/// Saturated-blob engine.
///
/// Samples the frame on a coarse grid, marks strongly coloured cells and reports
/// each 4-connected group of marked cells as one target. Targets are emitted in
/// row-major order of their first cell, so output is deterministic per frame.
#[derive(Default)]
pub struct ColorBlobEngine {
    config: ColorBlobConfig,
}

impl ColorBlobEngine {
    pub fn new(config: ColorBlobConfig) -> Self {
        Self { config }
    }

    fn saturated(&self, rgb: [u8; 3]) -> bool {
        let max = rgb.iter().copied().max().unwrap_or(0);
        let min = rgb.iter().copied().min().unwrap_or(0);
        max >= self.config.min_brightness && max - min >= self.config.min_saturation
    }
}

impl DetectionEngine for ColorBlobEngine {
    fn name(&self) -> &'static str {
        "color"
    }

    fn process_frame(&self, frame: &mut Frame) -> Result<()> {
        let cell = self.config.cell_size.max(1);
        let cols = frame.width.div_ceil(cell) as usize;
        let rows = frame.height.div_ceil(cell) as usize;

        let mut marked = vec![false; cols * rows];
        for row in 0..rows {
            for col in 0..cols {
                let x = (col as u32 * cell + cell / 2).min(frame.width - 1);
                let y = (row as u32 * cell + cell / 2).min(frame.height - 1);
                marked[row * cols + col] = self.saturated(frame.pixel(x, y));
            }
        }

        let mut seen = vec![false; cols * rows];
        let mut blobs = Vec::new();
        let mut stack = Vec::new();
        for start in 0..marked.len() {
            if !marked[start] || seen[start] {
                continue;
            }
            seen[start] = true;
            stack.push(start);
            let (mut min_c, mut min_r, mut max_c, mut max_r) = (cols, rows, 0, 0);
            let mut cells = 0usize;
            while let Some(idx) = stack.pop() {
                let (r, c) = (idx / cols, idx % cols);
                cells += 1;
                min_c = min_c.min(c);
                max_c = max_c.max(c);
                min_r = min_r.min(r);
                max_r = max_r.max(r);

                let mut visit = |n: usize| {
                    if marked[n] && !seen[n] {
                        seen[n] = true;
                        stack.push(n);
                    }
                };
                if c > 0 {
                    visit(idx - 1);
                }
                if c + 1 < cols {
                    visit(idx + 1);
                }
                if r > 0 {
                    visit(idx - cols);
                }
                if r + 1 < rows {
                    visit(idx + cols);
                }
            }
            if cells < self.config.min_cells {
                continue;
            }
            let x = min_c as u32 * cell;
            let y = min_r as u32 * cell;
            let w = ((max_c as u32 + 1) * cell).min(frame.width) - x;
            let h = ((max_r as u32 + 1) * cell).min(frame.height) - y;
            let span = (max_c - min_c + 1) * (max_r - min_r + 1);
            blobs.push((BoundingBox::new(x, y, w, h), cells as f32 / span as f32));
        }

        for (bbox, fill) in blobs {
            frame.add_target("color-blob", bbox, fill);
        }
        Ok(())
    }
}
