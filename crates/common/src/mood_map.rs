//! Static mood lookup table: emotion label -> quotes and songs.
//!
//! The table is read once at startup from a JSON document shaped like
//!
//! ```json
//! {
//!   "happy": {
//!     "quotes": { "en": ["..."], "hi": ["..."] },
//!     "songs": ["Title - Artist", { "title": "...", "artist": "..." }]
//!   }
//! }
//! ```
//!
//! Songs are passed through to clients verbatim.

use crate::emotion::Emotion;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Label used when the classified emotion has no entry
pub const FALLBACK_LABEL: &str = "neutral";

/// Language whose quotes are served
pub const QUOTE_LANGUAGE: &str = "en";

#[derive(Debug, Error)]
pub enum MoodTableError {
    #[error("failed to read mood map {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid mood map JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("mood map has no '{FALLBACK_LABEL}' entry")]
    MissingFallback,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoodEntry {
    /// Quotes keyed by language code
    #[serde(default)]
    pub quotes: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub songs: Vec<serde_json::Value>,
}

impl MoodEntry {
    /// Quotes served to clients; empty when the language is absent
    pub fn quotes(&self) -> &[String] {
        self.quotes
            .get(QUOTE_LANGUAGE)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn songs(&self) -> &[serde_json::Value] {
        &self.songs
    }

    pub fn is_complete(&self) -> bool {
        !self.quotes().is_empty() && !self.songs.is_empty()
    }
}

/// Immutable label -> entry map with a guaranteed fallback entry
#[derive(Debug, Clone)]
pub struct MoodTable {
    entries: HashMap<String, MoodEntry>,
}

impl MoodTable {
    pub fn from_entries(entries: HashMap<String, MoodEntry>) -> Result<Self, MoodTableError> {
        if !entries.contains_key(FALLBACK_LABEL) {
            return Err(MoodTableError::MissingFallback);
        }

        Ok(Self { entries })
    }

    pub fn from_json(json: &str) -> Result<Self, MoodTableError> {
        let entries: HashMap<String, MoodEntry> = serde_json::from_str(json)?;
        Self::from_entries(entries)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MoodTableError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| MoodTableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_json(&json)?;
        table.report_gaps();
        Ok(table)
    }

    /// Entry for `label`, or the fallback entry when the label is unknown
    pub fn resolve(&self, label: &str) -> Option<&MoodEntry> {
        self.entries
            .get(label)
            .or_else(|| self.entries.get(FALLBACK_LABEL))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels whose entry would fail a request with missing quote or song data
    pub fn incomplete_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_complete())
            .map(|(label, _)| label.as_str())
            .collect();
        labels.sort_unstable();
        labels
    }

    /// Log configuration gaps; requests still surface them individually.
    fn report_gaps(&self) {
        for emotion in Emotion::ALL {
            if !self.entries.contains_key(emotion.as_str()) {
                tracing::warn!(
                    emotion = %emotion,
                    "mood map has no entry, '{}' will be used", FALLBACK_LABEL
                );
            }
        }

        for label in self.incomplete_labels() {
            tracing::warn!(
                label = %label,
                "mood entry lacks '{}' quotes or songs", QUOTE_LANGUAGE
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "happy": {
            "quotes": { "en": ["Keep smiling."], "fr": ["Souriez."] },
            "songs": ["Happy - Pharrell Williams"]
        },
        "sad": {
            "quotes": { "en": ["This too shall pass."] },
            "songs": []
        },
        "neutral": {
            "quotes": { "en": ["Stay curious."] },
            "songs": [{ "title": "Weightless", "artist": "Marconi Union" }]
        }
    }"#;

    #[test]
    fn test_parse_sample_table() {
        let table = MoodTable::from_json(SAMPLE).unwrap();
        assert_eq!(table.len(), 3);

        let happy = table.resolve("happy").unwrap();
        assert_eq!(happy.quotes(), &["Keep smiling.".to_string()]);
        assert_eq!(happy.songs(), &[json!("Happy - Pharrell Williams")]);
    }

    #[test]
    fn test_unknown_label_resolves_to_fallback() {
        let table = MoodTable::from_json(SAMPLE).unwrap();
        let entry = table.resolve("disgust").unwrap();
        assert_eq!(entry, table.resolve(FALLBACK_LABEL).unwrap());
        assert_eq!(
            entry.songs()[0],
            json!({ "title": "Weightless", "artist": "Marconi Union" })
        );
    }

    #[test]
    fn test_missing_fallback_is_rejected() {
        let result = MoodTable::from_json(r#"{ "happy": { "quotes": {}, "songs": [] } }"#);
        assert!(matches!(result, Err(MoodTableError::MissingFallback)));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let table = MoodTable::from_json(r#"{ "neutral": {} }"#).unwrap();
        let entry = table.resolve("neutral").unwrap();
        assert!(entry.quotes().is_empty());
        assert!(entry.songs().is_empty());
        assert!(!entry.is_complete());
    }

    #[test]
    fn test_non_english_quotes_are_not_served() {
        let table = MoodTable::from_json(
            r#"{ "neutral": { "quotes": { "hi": ["..."] }, "songs": ["x"] } }"#,
        )
        .unwrap();
        assert!(table.resolve("neutral").unwrap().quotes().is_empty());
    }

    #[test]
    fn test_incomplete_labels() {
        let table = MoodTable::from_json(SAMPLE).unwrap();
        assert_eq!(table.incomplete_labels(), vec!["sad"]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emotion_map.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let table = MoodTable::load(&path).unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let result = MoodTable::load("/nonexistent/emotion_map.json");
        assert!(matches!(result, Err(MoodTableError::Io { .. })));
    }
}
