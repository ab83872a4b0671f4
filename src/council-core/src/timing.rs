//! Spoken-duration estimates for blob scheduling.
//!
//! When one audio stream carries several personas there are no real
//! boundaries to listen for, so switch instants are derived from text
//! length alone. The result is approximate and drifts from real speech.

use std::time::Duration;

use crate::config::PlaybackConfig;
use crate::segmenter::Segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationEstimator {
    per_char: Duration,
    pause: Duration,
}

impl Default for DurationEstimator {
    fn default() -> Self {
        Self::new(Duration::from_millis(60), Duration::from_millis(800))
    }
}

impl DurationEstimator {
    pub fn new(per_char: Duration, pause: Duration) -> Self {
        Self { per_char, pause }
    }

    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(
            Duration::from_millis(config.per_char_ms),
            Duration::from_millis(config.pause_ms),
        )
    }

    /// `chars × per_char + pause`.
    pub fn estimate(&self, text: &str) -> Duration {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        self.per_char.saturating_mul(chars).saturating_add(self.pause)
    }

    /// Offset of each segment's activation from the first one.
    pub fn schedule(&self, segments: &[Segment]) -> Vec<Duration> {
        let mut offset = Duration::ZERO;
        segments
            .iter()
            .map(|segment| {
                let at = offset;
                offset = offset.saturating_add(self.estimate(&segment.text));
                at
            })
            .collect()
    }
}
