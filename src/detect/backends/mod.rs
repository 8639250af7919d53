pub mod color;
pub mod motion;

pub use color::{ColorBlobConfig, ColorBlobEngine};
pub use motion::MotionEngine;
