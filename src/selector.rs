// Face selection and cropping for the capture path

use crate::error::Result;
use crate::models::{FaceBox, ImageRegion};
use image::{imageops, RgbImage};

/// Weight of the center distance in the selection score
const CENTER_DISTANCE_WEIGHT: f32 = 0.01;

/// Capability producing every face box found in a frame
pub trait FaceDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>>;
}

/// Picks the single most plausible face in a frame.
///
/// Larger, squarer and more centered boxes score higher:
/// `area * aspect_ratio / (1 + 0.01 * distance_to_center)`.
/// Equal scores resolve to the earliest box in `faces`.
pub fn select(faces: &[FaceBox], frame_width: u32, frame_height: u32) -> Option<FaceBox> {
    let frame_center = (frame_width as f32 / 2.0, frame_height as f32 / 2.0);

    let mut best: Option<(f32, FaceBox)> = None;
    for face in faces {
        let score = score(face, frame_center);
        match best {
            Some((best_score, _)) if score <= best_score => {}
            _ => best = Some((score, *face)),
        }
    }
    best.map(|(_, face)| face)
}

fn score(face: &FaceBox, frame_center: (f32, f32)) -> f32 {
    let longest = face.width.max(face.height);
    if longest == 0 {
        return 0.0;
    }
    let aspect_ratio = face.width.min(face.height) as f32 / longest as f32;

    let (cx, cy) = face.center();
    let distance = ((cx - frame_center.0).powi(2) + (cy - frame_center.1).powi(2)).sqrt();

    face.area() * aspect_ratio / (1.0 + CENTER_DISTANCE_WEIGHT * distance)
}

/// Crops `face` plus `padding` pixels on each side, clamped to the frame.
/// Returns `None` when the clamped crop is empty.
pub fn crop_face(frame: &RgbImage, face: &FaceBox, padding: u32) -> Option<ImageRegion> {
    let x1 = face.x.saturating_sub(padding).min(frame.width());
    let y1 = face.y.saturating_sub(padding).min(frame.height());
    let x2 = face
        .x
        .saturating_add(face.width)
        .saturating_add(padding)
        .min(frame.width());
    let y2 = face
        .y
        .saturating_add(face.height)
        .saturating_add(padding)
        .min(frame.height());

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    let pixels = imageops::crop_imm(frame, x1, y1, x2 - x1, y2 - y1).to_image();
    Some(ImageRegion::new(pixels, (x1, y1)))
}

/// Admits one frame out of every `interval` for classification
#[derive(Debug)]
pub struct FrameThrottle {
    interval: u32,
    frame_count: u64,
}

impl FrameThrottle {
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            frame_count: 0,
        }
    }

    /// Advances the frame counter, returning whether this frame is eligible
    pub fn tick(&mut self) -> bool {
        let eligible = self.frame_count % self.interval as u64 == 0;
        self.frame_count += 1;
        eligible
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
