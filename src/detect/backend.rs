use anyhow::Result;

use crate::frame::Frame;

/// Detection engine trait.
///
/// One engine instance is shared by every detection task, so implementations
/// take `&self` and keep any per-stream state behind their own lock.
///
/// Implementations MUST:
/// - Append findings to the frame with `Frame::add_target`, in the order found
/// - Not keep a reference to the frame or its pixels after returning
pub trait DetectionEngine: Send + Sync {
    /// Engine identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame, mutating its target list in place.
    fn process_frame(&self, frame: &mut Frame) -> Result<()>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
