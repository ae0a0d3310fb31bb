// Frame sources feeding the monitor

use crate::error::{EmotionTrackerError, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Supplier of raw RGB frames
pub trait FrameSource {
    /// Next frame, or `None` once the source is exhausted
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Replays the still images of a directory in file-name order
pub struct DirectorySource {
    frames: std::vec::IntoIter<PathBuf>,
}

impl DirectorySource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            EmotionTrackerError::FrameSource(format!("Failed to read directory {dir:?}: {e}"))
        })?;

        let mut frames: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_image(path))
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(EmotionTrackerError::FrameSource(format!(
                "No images found in {dir:?}"
            )));
        }
        info!("Replaying {} frame(s) from {}", frames.len(), dir.display());

        Ok(Self {
            frames: frames.into_iter(),
        })
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        for path in self.frames.by_ref() {
            match image::open(&path) {
                Ok(img) => return Ok(Some(img.to_rgb8())),
                // An unreadable file is skipped like a dropped camera frame
                Err(e) => warn!("Skipping unreadable frame {}: {}", path.display(), e),
            }
        }
        Ok(None)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "bmp"))
        .unwrap_or(false)
}
