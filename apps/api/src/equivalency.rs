//! Seniority equivalency: tier × jurisdiction → local title.
//!
//! The table is data. Jurisdiction sets may differ per tier; an absent jurisdiction
//! resolves to [`NOT_APPLICABLE`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NOT_APPLICABLE: &str = "N/A";

#[derive(Debug, Error)]
pub enum EquivalencyError {
    #[error("failed to read equivalency file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid equivalency JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("equivalency table has no tiers")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    /// Jurisdiction key (e.g. "UK") → local title.
    pub titles: BTreeMap<String, String>,
    #[serde(default)]
    pub responsibilities: String,
}

impl Tier {
    pub fn title_for(&self, jurisdiction: &str) -> &str {
        self.titles
            .get(jurisdiction)
            .map(String::as_str)
            .unwrap_or(NOT_APPLICABLE)
    }

    /// `(jurisdiction, title)` pairs for the selected jurisdictions, in request order.
    pub fn titles_for<'a>(&self, jurisdictions: &'a [String]) -> Vec<(&'a str, String)> {
        jurisdictions
            .iter()
            .map(|j| (j.as_str(), self.title_for(j).to_string()))
            .collect()
    }
}

/// Ordered list of tiers, most junior first. Never empty: built only through
/// `from_json` or `Default`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EquivalencyMap {
    tiers: Vec<Tier>,
}

fn tier(name: &str, titles: &[(&str, &str)], responsibilities: &str) -> Tier {
    Tier {
        name: name.to_string(),
        titles: titles
            .iter()
            .map(|(j, t)| (j.to_string(), t.to_string()))
            .collect(),
        responsibilities: responsibilities.to_string(),
    }
}

impl Default for EquivalencyMap {
    fn default() -> Self {
        Self {
            tiers: vec![
                tier(
                    "Tier 1: Foundation",
                    &[
                        ("UK", "Foundation Year 1-2 (FY1/FY2)"),
                        ("US", "Intern (PGY-1)"),
                        ("Australia", "Intern / Resident Medical Officer"),
                    ],
                    "Ward-based care under direct supervision; clerking, prescribing and core procedures.",
                ),
                tier(
                    "Tier 2: Junior Specialist",
                    &[
                        ("UK", "Core Trainee (CT1-CT2) / SHO"),
                        ("US", "Resident (PGY-2-3)"),
                        ("Australia", "Senior Resident Medical Officer"),
                    ],
                    "First on call for admissions; manages acutely unwell patients with indirect supervision.",
                ),
                tier(
                    "Tier 3: Senior Specialist",
                    &[
                        ("UK", "Specialty Registrar (ST3+)"),
                        ("US", "Senior Resident / Fellow"),
                        ("Australia", "Registrar"),
                    ],
                    "Leads the on-call team, supervises juniors and makes senior clinical decisions.",
                ),
                tier(
                    "Tier 4: Expert",
                    &[
                        ("UK", "Consultant"),
                        ("US", "Attending Physician"),
                        ("Australia", "Consultant / Staff Specialist"),
                    ],
                    "Holds ultimate clinical responsibility and leads service development.",
                ),
            ],
        }
    }
}

impl EquivalencyMap {
    pub fn from_json(json: &str) -> Result<Self, EquivalencyError> {
        let tiers: Vec<Tier> = serde_json::from_str(json)?;
        if tiers.is_empty() {
            return Err(EquivalencyError::Empty);
        }
        Ok(Self { tiers })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EquivalencyError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| EquivalencyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn tier(&self, name: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.name == name)
    }

    /// Title for `tier` in `jurisdiction`, or `N/A` when either is unknown.
    pub fn lookup(&self, tier: &str, jurisdiction: &str) -> &str {
        self.tier(tier)
            .map(|t| t.title_for(jurisdiction))
            .unwrap_or(NOT_APPLICABLE)
    }

    /// Resolves a stored or requested tier, falling back to the first tier when it is
    /// missing or no longer in the table.
    pub fn resolve(&self, name: Option<&str>) -> &Tier {
        name.and_then(|n| self.tier(n))
            .or_else(|| self.tiers.first())
            .expect("equivalency table has at least one tier")
    }

    /// Every jurisdiction key used by any tier, sorted.
    pub fn jurisdictions(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .tiers
            .iter()
            .flat_map(|t| t.titles.keys().map(String::as_str))
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }
}
