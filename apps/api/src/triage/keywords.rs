//! Keyword vocabularies driving segmentation and classification.
//!
//! Vocabularies are data: deployments swap them through a JSON file
//! (`KEYWORDS_PATH`) without touching the classifier.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeywordConfigError {
    #[error("failed to read keyword file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid keyword JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("keyword set '{0}' is empty")]
    EmptySet(&'static str),
}

/// Per-category keyword sets plus the strong section keywords used for header detection.
///
/// Matching is a case-insensitive substring test. `education` is optional: older
/// vocabularies have no education category and leave it unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordConfig {
    pub registration: Vec<String>,
    pub procedure: Vec<String>,
    pub academic: Vec<String>,
    #[serde(default)]
    pub education: Option<Vec<String>>,
    pub rotation: Vec<String>,
    pub section_headers: Vec<String>,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            registration: owned(&[
                "gmc",
                "licence",
                "license",
                "registration",
                "registered",
                "board certified",
                "usmle",
                "plab",
                "ahpra",
                "medical council",
            ]),
            procedure: owned(&[
                "procedure",
                "cannula",
                "intubation",
                "catheter",
                "suturing",
                "lumbar puncture",
                "chest drain",
                "central line",
                "arterial blood gas",
                "dops",
                "competenc",
            ]),
            academic: owned(&[
                "audit",
                "qip",
                "quality improvement",
                "research",
                "publication",
                "published",
                "journal",
                "poster",
                "teaching",
                "presentation",
            ]),
            education: Some(owned(&[
                "course",
                "seminar",
                "cme",
                "workshop",
                "conference",
                "webinar",
                "e-learning",
            ])),
            rotation: owned(&[
                "rotation",
                "hospital",
                "ward",
                "department",
                "trust",
                "placement",
                "house officer",
                "registrar",
                "consultant",
                "foundation",
                "clinic",
            ]),
            section_headers: owned(&[
                "hospital",
                "trust",
                "experience",
                "employment",
                "education",
                "qualifications",
            ]),
        }
    }
}

impl KeywordConfig {
    /// The older four-category vocabulary: no education bucket, narrower sets.
    #[cfg(test)]
    pub fn legacy() -> Self {
        Self {
            registration: owned(&["gmc", "license", "registration", "board"]),
            procedure: owned(&["procedure", "cannula", "intubation", "catheter", "suturing"]),
            academic: owned(&["audit", "qip", "research", "publication", "teaching"]),
            education: None,
            rotation: owned(&["rotation", "hospital", "ward", "department"]),
            section_headers: owned(&["hospital", "trust", "experience", "employment"]),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, KeywordConfigError> {
        let config: KeywordConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KeywordConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| KeywordConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Rejects sets that would silently never match.
    pub fn validate(&self) -> Result<(), KeywordConfigError> {
        let sets: [(&'static str, Option<&Vec<String>>); 6] = [
            ("registration", Some(&self.registration)),
            ("procedure", Some(&self.procedure)),
            ("academic", Some(&self.academic)),
            ("education", self.education.as_ref()),
            ("rotation", Some(&self.rotation)),
            ("section_headers", Some(&self.section_headers)),
        ];
        for (name, set) in sets {
            let Some(set) = set else { continue };
            if set.iter().all(|k| k.trim().is_empty()) {
                return Err(KeywordConfigError::EmptySet(name));
            }
        }
        Ok(())
    }
}

/// Lower-cases and trims a keyword list, dropping blanks.
pub(crate) fn normalize(words: &[String]) -> Vec<String> {
    words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid_and_has_education() {
        let config = KeywordConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.education.is_some());
    }

    #[test]
    fn test_legacy_config_has_no_education() {
        assert!(KeywordConfig::legacy().education.is_none());
    }

    #[test]
    fn test_from_json_education_defaults_to_disabled() {
        let json = r#"{
            "registration": ["gmc"],
            "procedure": ["cannula"],
            "academic": ["audit"],
            "rotation": ["ward"],
            "section_headers": ["EXPERIENCE"]
        }"#;
        let config = KeywordConfig::from_json(json).unwrap();
        assert!(config.education.is_none());
        assert_eq!(config.registration, vec!["gmc"]);
    }

    #[test]
    fn test_from_json_rejects_empty_set() {
        let json = r#"{
            "registration": [],
            "procedure": ["cannula"],
            "academic": ["audit"],
            "rotation": ["ward"],
            "section_headers": ["trust"]
        }"#;
        let err = KeywordConfig::from_json(json).unwrap_err();
        assert!(matches!(err, KeywordConfigError::EmptySet("registration")));
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        assert!(matches!(
            KeywordConfig::from_json("{not json"),
            Err(KeywordConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file_missing_path() {
        let err = KeywordConfig::from_file("/nonexistent/keywords.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/keywords.json"));
    }

    #[test]
    fn test_normalize_lowercases_and_drops_blanks() {
        let words = vec!["  GMC ".to_string(), "".to_string(), "Board".to_string()];
        assert_eq!(normalize(&words), vec!["gmc", "board"]);
    }
}
