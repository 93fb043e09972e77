pub mod emotion;
pub mod mood_map;
pub mod predictions;
pub mod validation;

pub use emotion::{Emotion, EmotionScores, EMOTION_COUNT};
pub use mood_map::{MoodEntry, MoodTable, MoodTableError, FALLBACK_LABEL};
pub use predictions::{ErrorResponse, PredictionResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
