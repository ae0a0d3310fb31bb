// Core data models for the emotion tracker

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::EmotionTrackerError;

/// Closed set of emotion labels produced by the classifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl Emotion {
    /// Number of labels in the set
    pub const COUNT: usize = 7;

    /// Every label, in classifier output order
    pub const ALL: [Emotion; Emotion::COUNT] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    /// Lowercase label name
    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = EmotionTrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Emotion::ALL
            .into_iter()
            .find(|emotion| emotion.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EmotionTrackerError::Config(format!("Unknown emotion label: {s}")))
    }
}

/// Confidence percentage (0-100) for every label in the set
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Confidences([f32; Emotion::COUNT]);

impl Confidences {
    /// Builds a distribution from `(label, percent)` pairs; unnamed labels are 0
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Emotion, f32)>,
    {
        let mut values = [0.0; Emotion::COUNT];
        for (emotion, percent) in pairs {
            values[emotion.index()] = percent;
        }
        Self(values)
    }

    /// Confidence for a single label
    pub fn get(&self, emotion: Emotion) -> f32 {
        self.0[emotion.index()]
    }

    /// Iterates labels in classifier output order
    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f32)> + '_ {
        Emotion::ALL.into_iter().map(|emotion| (emotion, self.get(emotion)))
    }

    /// Labels sorted by descending confidence; equal scores keep label order
    pub fn ranked(&self) -> Vec<(Emotion, f32)> {
        let mut ranked: Vec<(Emotion, f32)> = self.iter().collect();
        ranked.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    /// Label with the highest confidence, first in label order on ties
    pub fn dominant(&self) -> Option<(Emotion, f32)> {
        self.iter()
            .filter(|(_, percent)| percent.is_finite())
            .fold(None, |best, (emotion, percent)| match best {
                Some((_, best_percent)) if best_percent >= percent => best,
                _ => Some((emotion, percent)),
            })
    }

    /// Whether the distribution carries any usable signal
    pub fn is_informative(&self) -> bool {
        self.0.iter().all(|p| p.is_finite()) && self.0.iter().any(|&p| p > 0.0)
    }
}

/// Output of one successful classifier call
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationResult {
    /// Raw winning label (maximum confidence)
    pub label: Emotion,
    /// Full distribution over every label
    pub confidences: Confidences,
}

impl ClassificationResult {
    /// Creates a result from a distribution, or `None` if it carries no signal
    pub fn from_confidences(confidences: Confidences) -> Option<Self> {
        if !confidences.is_informative() {
            return None;
        }
        let (label, _) = confidences.dominant()?;
        Some(Self {
            label,
            confidences,
        })
    }
}

/// Face bounding box in source-frame coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    /// Creates a new FaceBox
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box area in pixels
    pub fn area(&self) -> f32 {
        self.width as f32 * self.height as f32
    }

    /// Box center in frame coordinates
    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }
}

/// RGB face crop together with its origin in the source frame
#[derive(Clone, Debug)]
pub struct ImageRegion {
    pixels: RgbImage,
    origin: (u32, u32),
}

impl ImageRegion {
    /// Creates a new ImageRegion
    pub fn new(pixels: RgbImage, origin: (u32, u32)) -> Self {
        Self { pixels, origin }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Offset of the top-left pixel in the source frame
    pub fn origin(&self) -> (u32, u32) {
        self.origin
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Consumes the region, handing over its pixel buffer
    pub fn into_pixels(self) -> RgbImage {
        self.pixels
    }
}
