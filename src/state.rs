// Shared holder of the current stabilized emotion

use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::models::{Confidences, Emotion};

/// Capacity of the label-change broadcast channel
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Label exposed to consumers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CurrentLabel {
    /// No stabilized result has been published yet
    #[default]
    Initializing,
    Emotion(Emotion),
}

impl CurrentLabel {
    pub fn emotion(self) -> Option<Emotion> {
        match self {
            CurrentLabel::Initializing => None,
            CurrentLabel::Emotion(emotion) => Some(emotion),
        }
    }
}

impl std::fmt::Display for CurrentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CurrentLabel::Initializing => f.write_str("initializing"),
            CurrentLabel::Emotion(emotion) => write!(f, "{emotion}"),
        }
    }
}

/// Complete view of the current emotion
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EmotionSnapshot {
    pub label: CurrentLabel,
    pub confidences: Confidences,
}

impl EmotionSnapshot {
    /// Confidence behind the displayed label, 0 while initializing
    pub fn label_confidence(&self) -> f32 {
        self.label
            .emotion()
            .map(|emotion| self.confidences.get(emotion))
            .unwrap_or(0.0)
    }
}

/// Single-writer, multi-reader record of the current emotion
pub struct PipelineState {
    current: RwLock<EmotionSnapshot>,
    changes: broadcast::Sender<EmotionSnapshot>,
}

impl PipelineState {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            current: RwLock::new(EmotionSnapshot::default()),
            changes,
        }
    }

    /// Replaces the whole record with a new stabilized result
    pub fn update(&self, label: Emotion, confidences: Confidences) {
        let snapshot = EmotionSnapshot {
            label: CurrentLabel::Emotion(label),
            confidences,
        };

        let previous = match self.current.write() {
            Ok(mut guard) => std::mem::replace(&mut *guard, snapshot),
            Err(poisoned) => {
                warn!("Emotion state lock was poisoned, recovering");
                let mut guard = poisoned.into_inner();
                std::mem::replace(&mut *guard, snapshot)
            }
        };

        if previous.label != snapshot.label {
            info!("Current emotion changed: {} -> {}", previous.label, snapshot.label);
            // No subscribers is a normal state
            let _ = self.changes.send(snapshot);
        }
    }

    /// Returns the current label and distribution
    pub fn read(&self) -> EmotionSnapshot {
        match self.current.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Subscribes to label changes
    pub fn subscribe(&self) -> broadcast::Receiver<EmotionSnapshot> {
        self.changes.subscribe()
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
