// Per-frame orchestration of the emotion pipeline on the capture thread

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::Result;
use crate::font::TextRenderer;
use crate::models::FaceBox;
use crate::overlay::{render_hud, render_overlay, HudInfo};
use crate::pipeline::{ClassificationPipeline, EmotionClassifier, StatsSnapshot};
use crate::selector::{crop_face, select, FrameThrottle};
use crate::stabilizer::{EmotionStabilizer, StableEmotion};
use crate::state::PipelineState;

/// Number of frame intervals averaged by the FPS counter
const FPS_WINDOW: usize = 30;

/// What happened to one frame
#[derive(Clone, Debug, Default)]
pub struct FrameReport {
    /// Face chosen by the selector, if any
    pub face: Option<FaceBox>,
    /// Whether a crop of that face entered the submission queue
    pub submitted: bool,
    /// Stabilized emotion published while handling this frame
    pub updated: Option<StableEmotion>,
}

/// Rolling frames-per-second estimate
#[derive(Debug)]
pub struct FpsCounter {
    last: Option<Instant>,
    rates: VecDeque<f32>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            last: None,
            rates: VecDeque::with_capacity(FPS_WINDOW),
        }
    }

    /// Records a frame at `now` and returns the averaged rate
    pub fn tick_at(&mut self, now: Instant) -> f32 {
        if let Some(last) = self.last.replace(now) {
            let elapsed = now.duration_since(last).as_secs_f32();
            if elapsed > 0.0 {
                if self.rates.len() == FPS_WINDOW {
                    self.rates.pop_front();
                }
                self.rates.push_back(1.0 / elapsed);
            }
        }
        self.average()
    }

    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    pub fn average(&self) -> f32 {
        if self.rates.is_empty() {
            return 0.0;
        }
        self.rates.iter().sum::<f32>() / self.rates.len() as f32
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Wires selection, classification, stabilization and rendering together.
///
/// For every frame it selects the best face, submits a padded crop on
/// throttled frames, drains the freshest classification, stabilizes it into
/// [`PipelineState`] and annotates the frame. None of these steps block.
pub struct EmotionMonitor {
    pipeline: ClassificationPipeline,
    stabilizer: EmotionStabilizer,
    state: Arc<PipelineState>,
    throttle: FrameThrottle,
    fps: FpsCounter,
    text: TextRenderer,
    face_padding: u32,
}

impl EmotionMonitor {
    /// Starts the classification worker and an empty state
    pub fn new<C>(classifier: C, config: &AppConfig) -> Result<Self>
    where
        C: EmotionClassifier + 'static,
    {
        config.validate()?;
        let pipeline = ClassificationPipeline::start(classifier, config.pipeline.clone())?;

        Ok(Self {
            pipeline,
            stabilizer: EmotionStabilizer::new(config.thresholds.clone()),
            state: Arc::new(PipelineState::new()),
            throttle: FrameThrottle::new(config.thresholds.frame_skip),
            fps: FpsCounter::new(),
            text: TextRenderer::load(&config.overlay.font),
            face_padding: config.capture.face_padding,
        })
    }

    /// Shared handle for consumers of the current emotion
    pub fn state(&self) -> Arc<PipelineState> {
        self.state.clone()
    }

    /// Handles one frame given the detector output for it, annotating
    /// `frame` in place
    pub fn process_frame(&mut self, frame: &mut RgbImage, faces: &[FaceBox]) -> FrameReport {
        let face = select(faces, frame.width(), frame.height());
        let eligible = self.throttle.tick();

        let submitted = match face {
            Some(face) if eligible => crop_face(frame, &face, self.face_padding)
                .map(|region| self.pipeline.submit(region))
                .unwrap_or(false),
            _ => false,
        };

        let updated = self.publish_latest();

        let snapshot = self.state.read();
        let shown: Vec<FaceBox> = face.into_iter().collect();
        render_overlay(
            frame,
            &shown,
            snapshot.label,
            &snapshot.confidences,
            &self.text,
        );

        let hud = HudInfo {
            fps: self.fps.tick(),
            queue_depth: self.pipeline.pending(),
            face_present: face.is_some(),
        };
        render_hud(frame, &hud, &self.text);

        FrameReport {
            face,
            submitted,
            updated,
        }
    }

    /// Stabilizes the freshest pending result into the shared state
    pub fn publish_latest(&mut self) -> Option<StableEmotion> {
        let result = self.pipeline.drain_latest()?;
        let stable = self.stabilizer.observe(&result);
        self.state.update(stable.label, stable.confidences);
        Some(stable)
    }

    /// Clears the smoothing window
    pub fn reset_history(&mut self) {
        self.stabilizer.reset();
        info!("Emotion history reset");
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.pipeline.stats()
    }

    pub fn frame_count(&self) -> u64 {
        self.throttle.frame_count()
    }

    /// Stops the classification worker; further frames are still annotated
    pub fn stop(&mut self) {
        let stats = self.pipeline.stats();
        debug!(?stats, "Stopping emotion monitor");
        self.pipeline.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fps_averages_recent_intervals() {
        let mut fps = FpsCounter::new();
        let start = Instant::now();
        assert_eq!(fps.tick_at(start), 0.0);
        fps.tick_at(start + Duration::from_millis(100));
        let rate = fps.tick_at(start + Duration::from_millis(200));
        assert!((rate - 10.0).abs() < 0.01);
    }

    #[test]
    fn fps_window_is_bounded() {
        let mut fps = FpsCounter::new();
        let start = Instant::now();
        for i in 0..100 {
            fps.tick_at(start + Duration::from_millis(i * 50));
        }
        assert_eq!(fps.rates.len(), FPS_WINDOW);
        assert!((fps.average() - 20.0).abs() < 0.01);
    }
}
