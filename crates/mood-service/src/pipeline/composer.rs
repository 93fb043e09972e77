use crate::error::PredictError;
use common::{MoodTable, PredictionResult};
use rand::seq::SliceRandom;
use rand::RngCore;

/// Turns a classified label into the response body
pub struct ResponseComposer {
    table: MoodTable,
}

impl ResponseComposer {
    pub fn new(table: MoodTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &MoodTable {
        &self.table
    }

    /// Pick one quote and one song for `emotion`, uniformly at random.
    ///
    /// Unknown labels use the fallback entry. The returned `emotion` is always
    /// the classified label, even when the data came from the fallback.
    pub fn compose(
        &self,
        emotion: &str,
        rng: &mut dyn RngCore,
    ) -> Result<PredictionResult, PredictError> {
        let entry = self
            .table
            .resolve(emotion)
            .ok_or(PredictError::IncompleteMoodData)?;

        let quote = entry
            .quotes()
            .choose(rng)
            .ok_or(PredictError::IncompleteMoodData)?;
        let song = entry
            .songs()
            .choose(rng)
            .ok_or(PredictError::IncompleteMoodData)?;

        Ok(PredictionResult {
            emotion: emotion.to_string(),
            quote: quote.clone(),
            song: song.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn composer() -> ResponseComposer {
        let table = MoodTable::from_json(
            &json!({
                "happy": {
                    "quotes": {"en": ["Smile!", "Joy!"], "hi": ["Khush raho"]},
                    "songs": ["Happy - Pharrell", {"title": "Good Day", "artist": "Ice Cube"}]
                },
                "sad": {
                    "quotes": {"en": []},
                    "songs": ["Hurt"]
                },
                "fear": {
                    "quotes": {"hi": ["Dar"]},
                    "songs": ["Thriller"]
                },
                "neutral": {
                    "quotes": {"en": ["Carry on."]},
                    "songs": ["Weightless"]
                }
            })
            .to_string(),
        )
        .unwrap();
        ResponseComposer::new(table)
    }

    #[test]
    fn test_compose_picks_from_entry() {
        let composer = composer();
        let mut rng = StdRng::seed_from_u64(7);

        let result = composer.compose("happy", &mut rng).unwrap();
        assert_eq!(result.emotion, "happy");
        assert!(["Smile!", "Joy!"].contains(&result.quote.as_str()));
        assert!(
            result.song == json!("Happy - Pharrell")
                || result.song == json!({"title": "Good Day", "artist": "Ice Cube"})
        );
    }

    #[test]
    fn test_compose_covers_every_choice() {
        let composer = composer();
        let mut rng = StdRng::seed_from_u64(42);

        let quotes: std::collections::HashSet<String> = (0..64)
            .map(|_| composer.compose("happy", &mut rng).unwrap().quote)
            .collect();
        assert_eq!(quotes.len(), 2);
    }

    #[test]
    fn test_same_seed_same_result() {
        let composer = composer();
        let a = composer.compose("happy", &mut StdRng::seed_from_u64(3)).unwrap();
        let b = composer.compose("happy", &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_label_uses_fallback_but_keeps_label() {
        let composer = composer();
        let mut rng = StdRng::seed_from_u64(1);

        let result = composer.compose("surprise", &mut rng).unwrap();
        assert_eq!(result.emotion, "surprise");
        assert_eq!(result.quote, "Carry on.");
        assert_eq!(result.song, json!("Weightless"));
    }

    #[test]
    fn test_empty_quotes_is_incomplete() {
        let composer = composer();
        let mut rng = StdRng::seed_from_u64(1);

        let err = composer.compose("sad", &mut rng).unwrap_err();
        assert!(matches!(err, PredictError::IncompleteMoodData));
    }

    #[test]
    fn test_missing_english_quotes_is_incomplete() {
        let composer = composer();
        let mut rng = StdRng::seed_from_u64(1);

        let err = composer.compose("fear", &mut rng).unwrap_err();
        assert!(matches!(err, PredictError::IncompleteMoodData));
    }
}
