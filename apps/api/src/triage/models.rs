use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Record categories a CV entry can be triaged into.
///
/// Declaration order is also the iteration order of a `TriageResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Clinical placement.
    Rotation,
    /// Skill or competency.
    Procedure,
    /// Audit, QIP, research, teaching or publication.
    Academic,
    /// Licence or board credential.
    Registration,
    /// Course, seminar or CME.
    Education,
    /// No signal matched; held for manual review.
    #[serde(alias = "uncategorized")]
    Fragment,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Rotation,
        Category::Procedure,
        Category::Academic,
        Category::Registration,
        Category::Education,
        Category::Fragment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Rotation => "rotation",
            Category::Procedure => "procedure",
            Category::Academic => "academic",
            Category::Registration => "registration",
            Category::Education => "education",
            Category::Fragment => "fragment",
        }
    }

    /// Maps a collaborator-supplied label onto a category.
    /// Accepts singular/plural forms and the synonyms extraction prompts tend to produce.
    pub fn from_label(label: &str) -> Option<Category> {
        let label = label.trim().to_lowercase().replace([' ', '-'], "_");
        let category = match label.as_str() {
            "rotation" | "rotations" | "placement" | "placements" | "experience"
            | "clinical_experience" | "employment" => Category::Rotation,
            "procedure" | "procedures" | "skill" | "skills" | "competency" | "competencies"
            | "procedural_skills" => Category::Procedure,
            "academic" | "academics" | "audit" | "audits" | "qip" | "qips" | "research"
            | "publication" | "publications" | "teaching" | "projects" => Category::Academic,
            "registration" | "registrations" | "license" | "licenses" | "licence" | "licences"
            | "credential" | "credentials" => Category::Registration,
            "education" | "course" | "courses" | "seminar" | "seminars" | "cme" => {
                Category::Education
            }
            "fragment" | "fragments" | "uncategorized" | "other" => Category::Fragment,
            _ => return None,
        };
        Some(category)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared format of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Resolves the format from a file name's extension. Only `.pdf` and `.docx` are accepted.
    pub fn from_filename(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            _ => None,
        }
    }
}

/// An uploaded document. Consumed once by the extractor.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub data: Bytes,
    pub format: DocumentFormat,
}

/// One line of extracted text, trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextLine {
    pub trimmed: String,
    /// 0-indexed position in the extracted text.
    pub number: usize,
}

impl TextLine {
    pub fn new(number: usize, raw: &str) -> Self {
        Self {
            trimmed: raw.trim().to_string(),
            number,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.trimmed.is_empty()
    }
}

/// A contiguous run of lines treated as one CV entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub text: String,
    /// First line of the block.
    pub header: String,
    pub first_line: usize,
    pub last_line: usize,
}

impl Block {
    /// Joins trimmed lines with newlines. Returns `None` when there is nothing to join.
    pub fn from_lines(lines: &[TextLine]) -> Option<Self> {
        let first = lines.first()?;
        let last = lines.last()?;
        let text = lines
            .iter()
            .map(|l| l.trimmed.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return None;
        }
        Some(Self {
            header: first.trimmed.clone(),
            text,
            first_line: first.number,
            last_line: last.number,
        })
    }

    pub fn char_len(&self) -> usize {
        self.text.trim().chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedBlock {
    pub block: Block,
    pub category: Category,
}

/// A bounded slice of the full document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    /// Offset of the first character, counted in chars.
    pub char_offset: usize,
    pub text: String,
}

/// A structured record returned by the assisted extraction path.
/// Field sets differ between categories, so fields stay free-form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub category: Category,
    pub fields: Map<String, Value>,
}

/// Category → ordered entries. Every category is always present, possibly empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriageResult<T> {
    buckets: BTreeMap<Category, Vec<T>>,
}

impl<T> Default for TriageResult<T> {
    fn default() -> Self {
        Self {
            buckets: Category::ALL.iter().map(|c| (*c, Vec::new())).collect(),
        }
    }
}

impl<T> TriageResult<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: Category, entry: T) {
        self.buckets.entry(category).or_default().push(entry);
    }

    /// Appends `entries` after whatever the category already holds.
    pub fn extend(&mut self, category: Category, entries: impl IntoIterator<Item = T>) {
        self.buckets.entry(category).or_default().extend(entries);
    }

    /// Concatenates every bucket of `other` onto this result, preserving order on both sides.
    pub fn merge(&mut self, other: TriageResult<T>) {
        for (category, entries) in other.buckets {
            self.extend(category, entries);
        }
    }

    pub fn get(&self, category: Category) -> &[T] {
        self.buckets
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &[T])> {
        self.buckets.iter().map(|(c, v)| (*c, v.as_slice()))
    }

    pub fn total(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
