// UltraFace style face detector running on ONNX Runtime

use crate::error::{EmotionTrackerError, Result};
use crate::models::FaceBox;
use crate::selector::FaceDetector;
use image::{imageops::FilterType, RgbImage};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use tracing::debug;

const INPUT_WIDTH: u32 = 320;
const INPUT_HEIGHT: u32 = 240;
const CENTER_VARIANCE: f32 = 0.1;
const SIZE_VARIANCE: f32 = 0.2;
/// Overlap above which the weaker of two candidates is suppressed
const IOU_THRESHOLD: f32 = 0.3;

/// Normalized candidate box in detector input space
#[derive(Clone, Copy, Debug)]
struct Candidate {
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

pub struct OnnxFaceDetector {
    session: Session,
    anchors: Vec<(f32, f32, f32, f32)>, // cx, cy, w, h
    score_threshold: f32,
}

impl OnnxFaceDetector {
    pub fn new(model_path: &Path, score_threshold: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)
            .map_err(|e| {
                EmotionTrackerError::ModelLoad(format!(
                    "Face detector load failed for {}: {e}",
                    model_path.display()
                ))
            })?;

        Ok(Self {
            session,
            anchors: generate_anchors(INPUT_WIDTH as usize, INPUT_HEIGHT as usize),
            score_threshold,
        })
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>> {
        let resized =
            image::imageops::resize(frame, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);

        // NCHW, normalized as (pixel - 127) / 128
        let plane = (INPUT_WIDTH * INPUT_HEIGHT) as usize;
        let mut input = vec![0.0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                input[c * plane + i] = (pixel[c] as f32 - 127.0) / 128.0;
            }
        }

        let input_tensor = Tensor::from_array((
            vec![1, 3, INPUT_HEIGHT as i64, INPUT_WIDTH as i64],
            input,
        ))?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let (_, scores) = outputs["scores"].try_extract_tensor::<f32>()?;
        let (_, boxes) = outputs["boxes"].try_extract_tensor::<f32>()?;
        if scores.len() < self.anchors.len() * 2 || boxes.len() < self.anchors.len() * 4 {
            return Err(EmotionTrackerError::FaceDetection(
                "Detector output does not match anchor count".to_string(),
            ));
        }

        let candidates = decode(&self.anchors, scores, boxes, self.score_threshold);
        let kept = non_max_suppression(candidates, IOU_THRESHOLD);
        debug!("Detected {} face(s)", kept.len());

        Ok(kept
            .iter()
            .filter_map(|candidate| to_face_box(candidate, frame.width(), frame.height()))
            .collect())
    }
}

fn decode(
    anchors: &[(f32, f32, f32, f32)],
    scores: &[f32],
    boxes: &[f32],
    threshold: f32,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (i, &(ax, ay, aw, ah)) in anchors.iter().enumerate() {
        let score = scores[i * 2 + 1];
        if score <= threshold {
            continue;
        }
        let cx = boxes[i * 4] * CENTER_VARIANCE * aw + ax;
        let cy = boxes[i * 4 + 1] * CENTER_VARIANCE * ah + ay;
        let w = (boxes[i * 4 + 2] * SIZE_VARIANCE).exp() * aw;
        let h = (boxes[i * 4 + 3] * SIZE_VARIANCE).exp() * ah;
        candidates.push(Candidate {
            score,
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        });
    }
    candidates
}

fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Scales a normalized candidate to frame pixels, clamped to the frame
fn to_face_box(candidate: &Candidate, width: u32, height: u32) -> Option<FaceBox> {
    let x1 = (candidate.x1 * width as f32).clamp(0.0, width as f32);
    let y1 = (candidate.y1 * height as f32).clamp(0.0, height as f32);
    let x2 = (candidate.x2 * width as f32).clamp(0.0, width as f32);
    let y2 = (candidate.y2 * height as f32).clamp(0.0, height as f32);
    let (w, h) = ((x2 - x1) as u32, (y2 - y1) as u32);
    if w == 0 || h == 0 {
        return None;
    }
    Some(FaceBox::new(x1 as u32, y1 as u32, w, h))
}

fn generate_anchors(width: usize, height: usize) -> Vec<(f32, f32, f32, f32)> {
    let shrinkage_list = [8, 16, 32, 64];
    let min_boxes: [&[f32]; 4] = [
        &[10.0, 16.0, 24.0],
        &[32.0, 48.0],
        &[64.0, 96.0],
        &[128.0, 192.0, 256.0],
    ];
    let mut anchors = Vec::new();

    let w = width as f32;
    let h = height as f32;

    for (shrinkage, boxes) in shrinkage_list.into_iter().zip(min_boxes) {
        let feature_h = (height as f32 / shrinkage as f32).ceil() as usize;
        let feature_w = (width as f32 / shrinkage as f32).ceil() as usize;

        for v in 0..feature_h {
            for u in 0..feature_w {
                let cx = (u as f32 * shrinkage as f32 + shrinkage as f32 / 2.0) / w;
                let cy = (v as f32 * shrinkage as f32 + shrinkage as f32 / 2.0) / h;

                for &min_box in boxes {
                    anchors.push((cx, cy, min_box / w, min_box / h));
                }
            }
        }
    }
    anchors
}
