// Webcam frame source

use crate::error::{EmotionTrackerError, Result};
use crate::source::FrameSource;
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use tracing::{error, info, warn};

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const CAPTURE_FPS: u32 = 30;

fn candidate_indices(index: u32) -> impl Iterator<Item = u32> {
    std::iter::once(index).chain(index.checked_add(1))
}

fn capture_format() -> RequestedFormat<'static> {
    let format = CameraFormat::new(
        Resolution::new(CAPTURE_WIDTH, CAPTURE_HEIGHT),
        FrameFormat::YUYV,
        CAPTURE_FPS,
    );
    RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format))
}

/// Live camera capture, streaming lazily on the first frame request
pub struct CameraSource {
    camera: Camera,
    streaming: bool,
}

impl CameraSource {
    /// Opens the camera at `index`. Device numbering starts at 1 on some
    /// platforms, so the next index is tried as well.
    pub fn new(index: u32) -> Result<Self> {
        let mut last_error = None;
        for candidate in candidate_indices(index) {
            match Camera::new(CameraIndex::Index(candidate), capture_format()) {
                Ok(camera) => {
                    info!(
                        index = candidate,
                        "Opened camera: {}",
                        camera.info().human_name()
                    );
                    return Ok(Self {
                        camera,
                        streaming: false,
                    });
                }
                Err(e) => {
                    warn!("Camera {} unavailable: {}", candidate, e);
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        error!("No usable camera near index {}", index);
        let tried: Vec<String> = candidate_indices(index).map(|i| i.to_string()).collect();
        Err(EmotionTrackerError::CameraInit(format!(
            "no camera at index {}; check that one is connected, \
             not held by another application and permitted: {reason}",
            tried.join(" or ")
        )))
    }

    /// Human-readable names of the cameras the platform reports
    pub fn list_devices() -> Result<Vec<String>> {
        let devices = nokhwa::query(ApiBackend::Auto)?;
        Ok(devices
            .iter()
            .map(|info| format!("{}: {}", info.index(), info.human_name()))
            .collect())
    }

    fn start_stream(&mut self) -> Result<()> {
        if !self.streaming {
            self.camera.open_stream()?;
            self.streaming = true;
        }
        Ok(())
    }

    pub fn stop_stream(&mut self) {
        if !std::mem::replace(&mut self.streaming, false) {
            return;
        }
        if let Err(e) = self.camera.stop_stream() {
            error!("Failed to stop camera stream: {}", e);
        }
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        self.start_stream()?;

        let buffer = self
            .camera
            .frame()
            .and_then(|raw| raw.decode_image::<RgbFormat>())
            .map_err(|e| EmotionTrackerError::FrameSource(format!("camera frame: {e}")))?;

        let (width, height) = (buffer.width(), buffer.height());
        RgbImage::from_raw(width, height, buffer.into_raw())
            .map(Some)
            .ok_or_else(|| {
                EmotionTrackerError::FrameSource(format!(
                    "decoded camera frame does not match {width}x{height}"
                ))
            })
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tries_the_next_index_too() {
        assert_eq!(candidate_indices(0).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn last_index_does_not_overflow() {
        assert_eq!(candidate_indices(u32::MAX).collect::<Vec<_>>(), vec![u32::MAX]);
    }
}
