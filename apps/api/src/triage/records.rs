//! Structured records: parsing collaborator output and shaping confirmed entries for storage.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::triage::models::{Block, Category, ExtractionRecord, TriageResult};

/// Substituted when none of a field's alternate keys is present.
pub const MISSING_FIELD: &str = "Unknown";

const TITLE_KEYS: &[&str] = &["title", "name", "role", "rotation", "procedure", "project"];
const ORGANIZATION_KEYS: &[&str] = &[
    "organization",
    "organisation",
    "hospital",
    "institution",
    "trust",
    "issuer",
    "body",
];
const DATE_KEYS: &[&str] = &["date", "dates", "period", "year", "start_date"];
const LEVEL_KEYS: &[&str] = &["level", "grade", "competence", "supervision"];

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("malformed extraction response: {0}")]
pub struct MalformedResponse(pub String);

/// Parses a collaborator response of the shape `{ "<category>": [ {<flat record>}, ... ] }`.
///
/// A non-object top level or a non-list category value rejects the whole response.
/// Individual list items that are not objects are skipped. Unknown category labels are
/// kept under `fragment` for manual review.
pub fn parse_category_records(
    value: Value,
) -> Result<TriageResult<ExtractionRecord>, MalformedResponse> {
    let Value::Object(categories) = value else {
        return Err(MalformedResponse(format!(
            "expected a JSON object of categories, got {}",
            json_kind(&value)
        )));
    };

    let mut result = TriageResult::new();
    for (label, entries) in categories {
        let Value::Array(entries) = entries else {
            return Err(MalformedResponse(format!(
                "category '{label}' is {}, expected a list",
                json_kind(&entries)
            )));
        };

        let category = Category::from_label(&label).unwrap_or_else(|| {
            warn!("Unknown extraction category '{label}', routing to fragment");
            Category::Fragment
        });

        for entry in entries {
            match entry {
                Value::Object(fields) => {
                    result.push(category, ExtractionRecord { category, fields })
                }
                other => warn!(
                    "Skipping non-object record ({}) under '{label}'",
                    json_kind(&other)
                ),
            }
        }
    }

    Ok(result)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

impl ExtractionRecord {
    /// First non-empty value among `keys`, rendered as text. Keys match case-insensitively.
    pub fn field(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| {
            self.fields
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .and_then(|(_, v)| value_as_text(v))
        })
    }

    pub fn field_or(&self, keys: &[&str], placeholder: &str) -> String {
        self.field(keys).unwrap_or_else(|| placeholder.to_string())
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_as_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null | Value::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// A record the user has confirmed, ready for one storage insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedRecord {
    pub category: Category,
    pub title: String,
    pub organization: String,
    pub date: String,
    pub level: String,
    /// Everything else the source carried, kept verbatim.
    #[serde(default)]
    pub details: Value,
}

impl ConfirmedRecord {
    pub fn from_extraction(record: &ExtractionRecord) -> Self {
        Self {
            category: record.category,
            title: record.field_or(TITLE_KEYS, MISSING_FIELD),
            organization: record.field_or(ORGANIZATION_KEYS, MISSING_FIELD),
            date: record.field_or(DATE_KEYS, MISSING_FIELD),
            level: record.field_or(LEVEL_KEYS, MISSING_FIELD),
            details: Value::Object(record.fields.clone()),
        }
    }

    /// Heuristic blocks carry no fields: the header stands in for the title and the
    /// full text goes to `details`.
    pub fn from_block(category: Category, block: &Block) -> Self {
        let mut details = Map::new();
        details.insert("text".to_string(), Value::String(block.text.clone()));
        details.insert("first_line".to_string(), Value::from(block.first_line));
        details.insert("last_line".to_string(), Value::from(block.last_line));
        Self {
            category,
            title: block.header.clone(),
            organization: MISSING_FIELD.to_string(),
            date: MISSING_FIELD.to_string(),
            level: MISSING_FIELD.to_string(),
            details: Value::Object(details),
        }
    }
}

/// Flattens an assisted result into confirmable records, category by category.
pub fn confirmable_records(result: &TriageResult<ExtractionRecord>) -> Vec<ConfirmedRecord> {
    result
        .iter()
        .flat_map(|(_, records)| records.iter().map(ConfirmedRecord::from_extraction))
        .collect()
}

/// Heuristic counterpart of [`confirmable_records`].
pub fn confirmable_blocks(result: &TriageResult<Block>) -> Vec<ConfirmedRecord> {
    result
        .iter()
        .flat_map(|(category, blocks)| {
            blocks
                .iter()
                .map(move |block| ConfirmedRecord::from_block(category, block))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_category_records() {
        let value = json!({
            "rotations": [
                {"title": "FY1 General Surgery", "hospital": "Royal Free"},
                {"title": "FY1 Acute Medicine"}
            ],
            "procedures": [{"name": "Arterial line", "level": "Independent"}],
            "hobbies": [{"name": "Rowing"}]
        });
        let result = parse_category_records(value).unwrap();
        assert_eq!(result.get(Category::Rotation).len(), 2);
        assert_eq!(result.get(Category::Procedure).len(), 1);
        assert_eq!(result.get(Category::Fragment).len(), 1);
        assert_eq!(
            result.get(Category::Rotation)[1].fields["title"],
            json!("FY1 Acute Medicine")
        );
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let err = parse_category_records(json!(["rotation"])).unwrap_err();
        assert!(err.0.contains("a list"));
    }

    #[test]
    fn test_parse_rejects_non_list_category() {
        assert!(parse_category_records(json!({"rotation": "FY1"})).is_err());
    }

    #[test]
    fn test_parse_skips_non_object_items() {
        let result = parse_category_records(json!({"audit": ["loose string", {"title": "VTE"}]}))
            .unwrap();
        assert_eq!(result.get(Category::Academic).len(), 1);
    }

    #[test]
    fn test_field_falls_back_through_alternate_keys() {
        let record = ExtractionRecord {
            category: Category::Registration,
            fields: json!({"Body": "GMC", "year": 2019, "title": "  "})
                .as_object()
                .cloned()
                .unwrap(),
        };
        assert_eq!(record.field(ORGANIZATION_KEYS).as_deref(), Some("GMC"));
        assert_eq!(record.field(DATE_KEYS).as_deref(), Some("2019"));
        // blank title does not count as present
        assert_eq!(record.field_or(TITLE_KEYS, MISSING_FIELD), "Unknown");
    }

    #[test]
    fn test_confirmed_record_from_sparse_extraction() {
        let record = ExtractionRecord {
            category: Category::Procedure,
            fields: json!({"procedure": "Chest drain", "supervision": ["direct", "indirect"]})
                .as_object()
                .cloned()
                .unwrap(),
        };
        let confirmed = ConfirmedRecord::from_extraction(&record);
        assert_eq!(confirmed.title, "Chest drain");
        assert_eq!(confirmed.level, "direct, indirect");
        assert_eq!(confirmed.organization, MISSING_FIELD);
        assert_eq!(confirmed.date, MISSING_FIELD);
        assert_eq!(confirmed.details["procedure"], json!("Chest drain"));
    }

    #[test]
    fn test_confirmed_record_from_block() {
        let block = Block {
            text: "2021 Audit\nRe-audit done".to_string(),
            header: "2021 Audit".to_string(),
            first_line: 4,
            last_line: 5,
        };
        let confirmed = ConfirmedRecord::from_block(Category::Academic, &block);
        assert_eq!(confirmed.title, "2021 Audit");
        assert_eq!(confirmed.details["first_line"], json!(4));
    }

    #[test]
    fn test_confirmable_records_flattens_in_category_order() {
        let result = parse_category_records(json!({
            "procedure": [{"name": "Cannula"}],
            "rotation": [{"title": "ED"}]
        }))
        .unwrap();
        let titles: Vec<_> = confirmable_records(&result)
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["ED", "Cannula"]);
    }
}
