//! Export bundle: the minimal input a PDF/CSV renderer needs. Rendering happens elsewhere.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::equivalency::Tier;
use crate::triage::models::TriageResult;
use crate::triage::records::ConfirmedRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JurisdictionTitle {
    pub jurisdiction: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportBundle {
    pub user_id: String,
    pub tier: String,
    pub responsibilities: String,
    pub titles: Vec<JurisdictionTitle>,
    pub records: TriageResult<ConfirmedRecord>,
    pub generated_at: DateTime<Utc>,
}

/// Groups records by category (input order kept within each) and resolves the
/// selected jurisdictions' titles for `tier`.
pub fn build_export_bundle(
    user_id: &str,
    records: impl IntoIterator<Item = ConfirmedRecord>,
    tier: &Tier,
    jurisdictions: &[String],
) -> ExportBundle {
    let mut grouped = TriageResult::new();
    for record in records {
        grouped.push(record.category, record);
    }

    let titles = tier
        .titles_for(jurisdictions)
        .into_iter()
        .map(|(jurisdiction, title)| JurisdictionTitle {
            jurisdiction: jurisdiction.to_string(),
            title,
        })
        .collect();

    ExportBundle {
        user_id: user_id.to_string(),
        tier: tier.name.clone(),
        responsibilities: tier.responsibilities.clone(),
        titles,
        records: grouped,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::equivalency::{EquivalencyMap, NOT_APPLICABLE};
    use crate::triage::models::Category;

    fn record(category: Category, title: &str) -> ConfirmedRecord {
        ConfirmedRecord {
            category,
            title: title.to_string(),
            organization: "Unknown".to_string(),
            date: "2021".to_string(),
            level: "Unknown".to_string(),
            details: Value::Null,
        }
    }

    #[test]
    fn test_bundle_groups_records_and_resolves_titles() {
        let map = EquivalencyMap::default();
        let tier = map.resolve(Some("Tier 3: Senior Specialist"));
        let records = vec![
            record(Category::Rotation, "ED"),
            record(Category::Academic, "Sepsis audit"),
            record(Category::Rotation, "ICU"),
        ];
        let selected = vec!["UK".to_string(), "Canada".to_string()];

        let bundle = build_export_bundle("dr@example.org", records, tier, &selected);

        assert_eq!(bundle.tier, "Tier 3: Senior Specialist");
        let rotations: Vec<_> = bundle
            .records
            .get(Category::Rotation)
            .iter()
            .map(|r| r.title.as_str())
            .collect();
        assert_eq!(rotations, vec!["ED", "ICU"]);
        assert_eq!(bundle.titles[0].title, "Specialty Registrar (ST3+)");
        assert_eq!(bundle.titles[1].title, NOT_APPLICABLE);
    }

    #[test]
    fn test_bundle_with_no_records() {
        let map = EquivalencyMap::default();
        let bundle = build_export_bundle("u1", Vec::new(), map.resolve(None), &[]);
        assert!(bundle.records.is_empty());
        assert!(bundle.titles.is_empty());
    }
}
