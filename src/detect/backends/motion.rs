use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

use crate::detect::backend::DetectionEngine;
use crate::detect::result::BoundingBox;
use crate::frame::Frame;

/// Motion engine. Hashes the pixels and reports a whole-frame target whenever
/// the content differs from the previous frame it saw.
#[derive(Default)]
pub struct MotionEngine {
    last_hash: Mutex<Option<[u8; 32]>>,
}

impl MotionEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DetectionEngine for MotionEngine {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn process_frame(&self, frame: &mut Frame) -> Result<()> {
        let current_hash: [u8; 32] = Sha256::digest(frame.pixels()).into();

        let motion = {
            let mut last = self
                .last_hash
                .lock()
                .map_err(|_| anyhow!("motion engine lock poisoned"))?;
            let motion = last.is_some_and(|prev| prev != current_hash);
            *last = Some(current_hash);
            motion
        };

        if motion {
            let bbox = BoundingBox::new(0, 0, frame.width, frame.height);
            frame.add_target("motion", bbox, 0.85);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(seq: u64, value: u8) -> Frame {
        Frame::new(seq, 4, 4, vec![value; 48]).unwrap()
    }

    #[test]
    fn motion_engine_detects_changes() -> Result<()> {
        let engine = MotionEngine::new();

        let mut f1 = flat(1, 10);
        engine.process_frame(&mut f1)?;
        assert!(f1.targets().is_empty());

        let mut f2 = flat(2, 20);
        engine.process_frame(&mut f2)?;
        assert_eq!(f2.targets().len(), 1);
        assert_eq!(f2.targets()[0].bbox, BoundingBox::new(0, 0, 4, 4));
        assert_eq!(f2.targets()[0].confidence, 0.85);

        let mut f3 = flat(3, 20);
        engine.process_frame(&mut f3)?;
        assert!(f3.targets().is_empty());
        Ok(())
    }
}
