//! Category Classifier — ordered keyword-set matching with a year fallback.

use regex::Regex;

use crate::triage::keywords::{normalize, KeywordConfig};
use crate::triage::models::Category;

/// Pure-Rust keyword classifier. Deterministic, no LLM call.
///
/// Algorithm:
/// 1. Lower-case the block text.
/// 2. Test keyword sets in fixed priority order:
///    registration → procedure → academic → education (if enabled) → rotation.
///    The first set with any substring hit wins.
/// 3. No hit: a bare `20xx` year token means `rotation`, otherwise `fragment`.
///
/// Matching is substring, not word-boundary, so "gmc" hits inside "gmc-registered"
/// and "ward" hits inside "award".
#[derive(Debug, Clone)]
pub struct Classifier {
    ordered_sets: Vec<(Category, Vec<String>)>,
    year_token: Regex,
}

impl Classifier {
    pub fn new(config: &KeywordConfig) -> Self {
        let mut ordered_sets = vec![
            (Category::Registration, normalize(&config.registration)),
            (Category::Procedure, normalize(&config.procedure)),
            (Category::Academic, normalize(&config.academic)),
        ];
        if let Some(education) = &config.education {
            ordered_sets.push((Category::Education, normalize(education)));
        }
        ordered_sets.push((Category::Rotation, normalize(&config.rotation)));

        Self {
            ordered_sets,
            year_token: Regex::new(r"\b20\d{2}\b").expect("year pattern is valid"),
        }
    }

    pub fn classify(&self, text: &str) -> Category {
        let lowered = text.to_lowercase();

        for (category, keywords) in &self.ordered_sets {
            if keywords.iter().any(|k| lowered.contains(k.as_str())) {
                return *category;
            }
        }

        if self.year_token.is_match(&lowered) {
            Category::Rotation
        } else {
            Category::Fragment
        }
    }

    /// Categories this classifier can emit, in priority order, fallback last.
    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<_> = self.ordered_sets.iter().map(|(c, _)| *c).collect();
        categories.push(Category::Fragment);
        categories
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&KeywordConfig::default())
    }
}
