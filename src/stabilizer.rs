// Turns noisy per-call classifications into a stable, displayable emotion

use std::collections::VecDeque;

use tracing::debug;

use crate::config::Thresholds;
use crate::models::{ClassificationResult, Confidences, Emotion};

/// Ring buffer of the most recent raw winning labels
#[derive(Clone, Debug)]
pub struct EmotionHistory {
    labels: VecDeque<Emotion>,
    capacity: usize,
}

impl EmotionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            labels: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a label, evicting the oldest one when full
    pub fn push(&mut self, label: Emotion) {
        if self.labels.len() == self.capacity {
            self.labels.pop_front();
        }
        self.labels.push_back(label);
    }

    /// Most frequent label in the window; ties go to the label seen first
    pub fn majority(&self) -> Option<Emotion> {
        let mut counts = [0usize; Emotion::COUNT];
        let mut first_seen: Vec<Emotion> = Vec::with_capacity(Emotion::COUNT);
        for &label in &self.labels {
            counts[label as usize] += 1;
            if !first_seen.contains(&label) {
                first_seen.push(label);
            }
        }

        let mut best: Option<(Emotion, usize)> = None;
        for label in first_seen {
            let count = counts[label as usize];
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((label, count)),
            }
        }
        best.map(|(label, _)| label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.labels.clear();
    }
}

impl FromIterator<Emotion> for EmotionHistory {
    /// Builds a history sized to fit every label
    fn from_iter<I: IntoIterator<Item = Emotion>>(iter: I) -> Self {
        let labels: VecDeque<Emotion> = iter.into_iter().collect();
        let capacity = labels.len().max(1);
        Self { labels, capacity }
    }
}

/// Label shown to consumers together with the distribution behind it
#[derive(Clone, Debug, PartialEq)]
pub struct StableEmotion {
    pub label: Emotion,
    pub confidences: Confidences,
}

/// Applies the override rules to a majority label.
///
/// Pure: the result depends only on its arguments.
pub fn apply_overrides(
    majority: Emotion,
    latest: &Confidences,
    thresholds: &Thresholds,
) -> Emotion {
    let confidence = latest.get(majority);
    match majority {
        Emotion::Neutral if confidence >= thresholds.neutral_retain => Emotion::Neutral,
        Emotion::Neutral => first_alternative(latest, Emotion::Neutral, |label| {
            thresholds.neutral_floor(label)
        })
        .unwrap_or(Emotion::Neutral),
        Emotion::Happy if confidence <= thresholds.happy_ceiling => {
            first_alternative(latest, Emotion::Happy, |_| thresholds.happy_alternative_floor)
                .unwrap_or(Emotion::Happy)
        }
        other => other,
    }
}

/// Scans labels other than `excluded` by descending confidence and returns
/// the first one strictly above its floor
fn first_alternative(
    latest: &Confidences,
    excluded: Emotion,
    floor: impl Fn(Emotion) -> f32,
) -> Option<Emotion> {
    latest
        .ranked()
        .into_iter()
        .filter(|(label, _)| *label != excluded)
        .find(|(label, percent)| *percent > floor(*label))
        .map(|(label, _)| label)
}

/// Decides the stable label for a history and the latest distribution
pub fn stabilize(
    history: &EmotionHistory,
    latest: &Confidences,
    thresholds: &Thresholds,
) -> Option<Emotion> {
    history
        .majority()
        .map(|majority| apply_overrides(majority, latest, thresholds))
}

/// Stateful wrapper owning the smoothing window.
///
/// Each raw result first goes through a majority vote over recent winning
/// labels. The majority is then checked against the latest distribution: a
/// weak neutral or weak happy is replaced by the strongest alternative that
/// clears its floor.
pub struct EmotionStabilizer {
    history: EmotionHistory,
    thresholds: Thresholds,
}

impl EmotionStabilizer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            history: EmotionHistory::new(thresholds.window_size),
            thresholds,
        }
    }

    /// Feeds one raw classification and returns the stabilized emotion
    pub fn observe(&mut self, result: &ClassificationResult) -> StableEmotion {
        self.history.push(result.label);
        let label = stabilize(&self.history, &result.confidences, &self.thresholds)
            .unwrap_or(result.label);

        debug!(
            raw = %result.label,
            stable = %label,
            window = self.history.len(),
            "Stabilized emotion"
        );

        StableEmotion {
            label,
            confidences: result.confidences,
        }
    }

    /// Forgets all smoothing history
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &EmotionHistory {
        &self.history
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }
}
