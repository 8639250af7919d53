mod backend;
mod backends;
mod registry;
mod result;

pub use backend::DetectionEngine;
pub use backends::{ColorBlobConfig, ColorBlobEngine, MotionEngine};
pub use registry::EngineRegistry;
pub use result::{BoundingBox, Target};
