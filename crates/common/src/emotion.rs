use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of classes produced by the emotion model
pub const EMOTION_COUNT: usize = 7;

/// Emotion classes in the positional order of the model output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
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
    /// All labels, index-aligned with `EmotionScores`
    pub const ALL: [Emotion; EMOTION_COUNT] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
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

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ScoresError {
    #[error("expected {EMOTION_COUNT} emotion scores, model produced {0}")]
    WrongLength(usize),
}

/// Per-class probabilities from the emotion model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionScores([f32; EMOTION_COUNT]);

impl EmotionScores {
    pub fn new(scores: [f32; EMOTION_COUNT]) -> Self {
        Self(scores)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn score(&self, emotion: Emotion) -> f32 {
        self.0[emotion.index()]
    }

    /// Highest scoring emotion. Ties resolve to the lowest index; NaN never wins.
    pub fn top(&self) -> (Emotion, f32) {
        let mut best = 0;
        for (i, &score) in self.0.iter().enumerate().skip(1) {
            if score > self.0[best] || (self.0[best].is_nan() && !score.is_nan()) {
                best = i;
            }
        }
        (Emotion::ALL[best], self.0[best])
    }
}

impl TryFrom<&[f32]> for EmotionScores {
    type Error = ScoresError;

    fn try_from(values: &[f32]) -> Result<Self, Self::Error> {
        let scores: [f32; EMOTION_COUNT] = values
            .try_into()
            .map_err(|_| ScoresError::WrongLength(values.len()))?;
        Ok(Self(scores))
    }
}
