// Emotion classifier backed by an HSEmotion ONNX model

use crate::error::{EmotionTrackerError, Result};
use crate::models::{Confidences, Emotion};
use crate::pipeline::EmotionClassifier;
use image::{imageops::FilterType, RgbImage};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::error;

/// Square input edge expected by the model
const INPUT_SIZE: u32 = 260;

/// HSEmotion output order: 0=Angry, 1=Disgust, 2=Fear, 3=Happy, 4=Sad,
/// 5=Surprise, 6=Neutral, 7=Contempt (folded into Disgust)
const OUTPUT_LABELS: [Emotion; 8] = [
    Emotion::Angry,
    Emotion::Disgust,
    Emotion::Fear,
    Emotion::Happy,
    Emotion::Sad,
    Emotion::Surprise,
    Emotion::Neutral,
    Emotion::Disgust,
];

/// Emotion classifier using ONNX Runtime
pub struct OnnxEmotionClassifier {
    session: Session,
}

impl OnnxEmotionClassifier {
    /// Creates a new classifier by loading the ONNX model
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e| {
                EmotionTrackerError::ModelLoad(format!("Failed to create session builder: {e}"))
            })?
            .commit_from_file(model_path)
            .map_err(|e| {
                error!("Failed to load ONNX model {}: {}", model_path.display(), e);
                EmotionTrackerError::ModelLoad(format!("ONNX model load failed: {e}"))
            })?;

        Ok(Self { session })
    }
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&mut self, face: &RgbImage) -> Result<Confidences> {
        let input = to_chw(face);
        let size = INPUT_SIZE as i64;
        let input_tensor = Tensor::from_array((vec![1, 3, size, size], input)).map_err(|e| {
            EmotionTrackerError::OnnxRuntime(format!("Failed to create input tensor: {e}"))
        })?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let (_, output_value) = outputs
            .iter()
            .next()
            .ok_or_else(|| {
                EmotionTrackerError::Classification("No output from model".to_string())
            })?;

        let (_, logits) = output_value.try_extract_tensor::<f32>()?;
        percentages_from_logits(logits)
    }
}

/// Resizes to the model input and converts HWC bytes to normalized CHW floats
fn to_chw(face: &RgbImage) -> Vec<f32> {
    let resized = image::imageops::resize(face, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;

    let mut chw = vec![0.0f32; 3 * plane];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            chw[c * plane + i] = pixel[c] as f32 / 255.0;
        }
    }
    chw
}

/// Softmax over the raw logits, mapped onto the label set as percentages
fn percentages_from_logits(logits: &[f32]) -> Result<Confidences> {
    if logits.len() < OUTPUT_LABELS.len() - 1 {
        return Err(EmotionTrackerError::Classification(format!(
            "Expected {} logits, got {}",
            OUTPUT_LABELS.len(),
            logits.len()
        )));
    }

    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
    if !exp_sum.is_finite() || exp_sum <= 0.0 {
        return Err(EmotionTrackerError::Classification(
            "Model produced non-finite scores".to_string(),
        ));
    }

    let mut percents = [0.0f32; Emotion::COUNT];
    for (logit, label) in logits.iter().zip(OUTPUT_LABELS) {
        percents[label as usize] += (logit - max_logit).exp() / exp_sum * 100.0;
    }

    Ok(Confidences::from_pairs(
        Emotion::ALL.into_iter().zip(percents),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contempt_is_folded_into_disgust() {
        let logits = [0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let confidences = percentages_from_logits(&logits).unwrap();
        let total: f32 = confidences.iter().map(|(_, p)| p).sum();
        assert!((total - 100.0).abs() < 0.01);
        assert_eq!(confidences.dominant().unwrap().0, Emotion::Disgust);
    }

    #[test]
    fn short_output_is_rejected() {
        assert!(percentages_from_logits(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn chw_layout_separates_channels() {
        let face = RgbImage::from_pixel(10, 10, image::Rgb([255, 0, 51]));
        let chw = to_chw(&face);
        let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
        assert_eq!(chw[0], 1.0);
        assert_eq!(chw[plane], 0.0);
        assert!((chw[2 * plane] - 0.2).abs() < 1e-6);
    }
}
