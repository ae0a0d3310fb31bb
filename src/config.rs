// Configuration for the emotion tracker, loaded from JSON

use crate::error::{EmotionTrackerError, Result};
use crate::models::Emotion;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Top-level configuration file layout
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub thresholds: Thresholds,
    pub capture: CaptureConfig,
    pub overlay: OverlayConfig,
    pub models: ModelConfig,
}

/// Queue sizing and worker behaviour of the classification pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum pending face regions awaiting classification
    pub submission_capacity: usize,
    /// Maximum completed results awaiting the stabilizer
    pub result_capacity: usize,
    /// Worker sleep between empty-queue polls
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for the worker during shutdown
    pub join_timeout_ms: u64,
    /// Regions narrower or shorter than this are upscaled before classification
    pub min_region_size: u32,
    /// Square edge length used when upscaling small regions
    pub upscale_size: u32,
    /// Contrast gain applied before classification
    pub contrast_alpha: f32,
    /// Brightness offset applied before classification
    pub brightness_beta: f32,
}

/// Minimum confidence a label needs to replace a weak neutral
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelFloor {
    pub label: Emotion,
    pub floor: f32,
}

/// Smoothing and override thresholds
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Number of recent raw labels kept for the majority vote
    pub window_size: usize,
    /// Submit a face only on every Nth frame
    pub frame_skip: u32,
    /// Neutral at or above this confidence is kept as is
    pub neutral_retain: f32,
    /// Happy at or below this confidence may be replaced
    pub happy_ceiling: f32,
    /// Confidence an alternative needs to replace a weak happy
    pub happy_alternative_floor: f32,
    /// Per-label floors consulted when escaping a weak neutral
    pub neutral_floors: Vec<LabelFloor>,
    /// Floor for labels absent from `neutral_floors`
    pub default_floor: f32,
}

/// Frame capture and cropping options
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Pixels added around the selected face before cropping
    pub face_padding: u32,
    /// Flip frames horizontally before processing
    pub mirror: bool,
}

/// Annotation text settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// TrueType family name or `.ttf` path; empty selects the bitmap font
    pub font: String,
}

/// Model locations for the ONNX backed detector and classifier
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub face_detector: PathBuf,
    pub emotion_classifier: PathBuf,
    /// Minimum detector score for a face candidate
    pub detector_score_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            submission_capacity: 5,
            result_capacity: 2,
            poll_interval_ms: 10,
            join_timeout_ms: 1_000,
            min_region_size: 100,
            upscale_size: 224,
            contrast_alpha: 1.2,
            brightness_beta: 10.0,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            window_size: 5,
            frame_skip: 2,
            neutral_retain: 95.0,
            happy_ceiling: 70.0,
            happy_alternative_floor: 5.0,
            neutral_floors: vec![
                LabelFloor {
                    label: Emotion::Angry,
                    floor: 12.0,
                },
                LabelFloor {
                    label: Emotion::Sad,
                    floor: 2.5,
                },
            ],
            default_floor: 5.0,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            face_padding: 30,
            mirror: true,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font: "DejaVuSans".to_string(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            face_detector: PathBuf::from("assets/models/face_detection.onnx"),
            emotion_classifier: PathBuf::from("assets/models/emotion.onnx"),
            detector_score_threshold: 0.7,
        }
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Rejects settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.submission_capacity == 0 || self.result_capacity == 0 {
            return Err(EmotionTrackerError::Config(
                "queue capacities must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(EmotionTrackerError::Config(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.upscale_size == 0 {
            return Err(EmotionTrackerError::Config(
                "upscale_size must be positive".to_string(),
            ));
        }
        if !self.contrast_alpha.is_finite() || !self.brightness_beta.is_finite() {
            return Err(EmotionTrackerError::Config(
                "contrast and brightness must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

impl Thresholds {
    /// Floor a label must exceed to replace a weak neutral
    pub fn neutral_floor(&self, label: Emotion) -> f32 {
        self.neutral_floors
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.floor)
            .unwrap_or(self.default_floor)
    }

    /// Rejects settings the stabilizer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(EmotionTrackerError::Config(
                "window_size must be at least 1".to_string(),
            ));
        }
        if self.frame_skip == 0 {
            return Err(EmotionTrackerError::Config(
                "frame_skip must be at least 1".to_string(),
            ));
        }
        let all_finite = [
            self.neutral_retain,
            self.happy_ceiling,
            self.happy_alternative_floor,
            self.default_floor,
        ]
        .into_iter()
        .chain(self.neutral_floors.iter().map(|entry| entry.floor))
        .all(f32::is_finite);
        if !all_finite {
            return Err(EmotionTrackerError::Config(
                "thresholds must be finite numbers".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file is missing or cannot be parsed
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)?;
            match serde_json::from_str::<AppConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Error parsing config {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            }
        } else {
            info!("Configuration file {} not found, using defaults", path.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.thresholds.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "thresholds": { "window_size": 7 } }"#).unwrap();
        assert_eq!(config.thresholds.window_size, 7);
        assert_eq!(config.thresholds.frame_skip, 2);
        assert_eq!(config.pipeline.submission_capacity, 5);
        assert_eq!(config.pipeline.result_capacity, 2);
    }

    #[test]
    fn neutral_floor_table_lookup() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.neutral_floor(Emotion::Angry), 12.0);
        assert_eq!(thresholds.neutral_floor(Emotion::Sad), 2.5);
        assert_eq!(thresholds.neutral_floor(Emotion::Fear), 5.0);
    }

    #[test]
    fn floors_deserialize_from_label_names() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "thresholds": { "neutral_floors": [ { "label": "surprise", "floor": 9.0 } ] } }"#,
        )
        .unwrap();
        assert_eq!(config.thresholds.neutral_floor(Emotion::Surprise), 9.0);
        assert_eq!(config.thresholds.neutral_floor(Emotion::Angry), 5.0);
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut config = AppConfig::default();
        config.thresholds.window_size = 0;
        assert!(matches!(config.validate(), Err(EmotionTrackerError::Config(_))));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(EmotionTrackerError::Config(_))));

        config.pipeline.poll_interval_ms = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AppConfig::load(Path::new("does/not/exist.json")).unwrap();
        assert_eq!(config.thresholds.window_size, 5);
    }
}
