//! Image directory frame source.
//!
//! `DirectorySource` replays still images from a local directory:
//! - Files are read in name order
//! - Only `jpg`, `jpeg`, `png` and `bmp` files are considered
//! - Each image is decoded in-memory to RGB8
//! - The file's modification time is used as the capture time for telemetry lookup
//!
//! Files that fail to decode are logged and skipped.

use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use super::FrameSource;
use crate::frame::Frame;
use crate::telemetry::MetadataSource;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

pub struct DirectorySource {
    dir: PathBuf,
    pending: VecDeque<PathBuf>,
    metadata: Option<Arc<dyn MetadataSource>>,
    next_seq: u64,
    skipped: u64,
}

impl DirectorySource {
    pub fn open(dir: &Path, metadata: Option<Arc<dyn MetadataSource>>) -> Result<Self> {
        if !dir.is_dir() {
            return Err(anyhow!("image source {} is not a directory", dir.display()));
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to list image directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_image_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        log::info!(
            "DirectorySource: {} images queued from {}",
            files.len(),
            dir.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            pending: files.into(),
            metadata,
            next_seq: 1,
            skipped: 0,
        })
    }

    /// Images not yet read.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Images that failed to decode so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn load(&self, path: &Path, seq: u64) -> Result<Frame> {
        let image = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgb8();
        let captured_at = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .unwrap_or_else(|_| SystemTime::now());
        let telemetry = self
            .metadata
            .as_ref()
            .and_then(|source| source.metadata_at(captured_at));
        let origin = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Frame::from_image(seq, image)?
            .with_captured_at(captured_at)
            .with_telemetry(telemetry)
            .with_origin(origin))
    }
}

impl FrameSource for DirectorySource {
    fn name(&self) -> String {
        format!("images:{}", self.dir.display())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        while let Some(path) = self.pending.pop_front() {
            match self.load(&path, self.next_seq) {
                Ok(frame) => {
                    self.next_seq += 1;
                    return Ok(Some(frame));
                }
                Err(e) => {
                    self.skipped += 1;
                    log::warn!("DirectorySource: skipping {}: {:#}", path.display(), e);
                }
            }
        }
        Ok(None)
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::FileMetadataSource;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, value: u8) {
        let image = RgbImage::from_pixel(6, 4, Rgb([value, value, value]));
        image.save(dir.join(name)).unwrap();
    }

    #[test]
    fn reads_images_in_name_order_then_reports_end() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_png(dir.path(), "b.png", 2);
        write_png(dir.path(), "a.png", 1);
        std::fs::write(dir.path().join("notes.txt"), b"not an image")?;

        let mut source = DirectorySource::open(dir.path(), None)?;
        assert_eq!(source.remaining(), 2);

        let first = source.next_frame()?.expect("first frame");
        assert_eq!(first.seq, 1);
        assert_eq!(first.origin.as_deref(), Some("a.png"));
        assert_eq!(first.pixel(0, 0), [1, 1, 1]);

        let second = source.next_frame()?.expect("second frame");
        assert_eq!(second.seq, 2);
        assert_eq!(second.origin.as_deref(), Some("b.png"));

        assert!(source.next_frame()?.is_none());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn skips_undecodable_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("a.jpg"), b"definitely not a jpeg")?;
        write_png(dir.path(), "b.PNG", 5);

        let mut source = DirectorySource::open(dir.path(), None)?;
        let frame = source.next_frame()?.expect("decodable frame");
        assert_eq!(frame.seq, 1);
        assert_eq!(source.skipped(), 1);
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn attaches_telemetry() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_png(dir.path(), "a.png", 1);
        let metadata: Arc<dyn MetadataSource> =
            Arc::new(FileMetadataSource::from_log("1000,43.0,-80.0,100.0,0.0\n")?);

        let mut source = DirectorySource::open(dir.path(), Some(metadata))?;
        let frame = source.next_frame()?.expect("frame");
        assert_eq!(frame.telemetry.map(|t| t.latitude), Some(43.0));
        Ok(())
    }

    #[test]
    fn empty_directory_is_exhausted_immediately() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = DirectorySource::open(dir.path(), None)?;
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectorySource::open(&dir.path().join("missing"), None).is_err());
    }
}
