// Assisted extraction prompt templates.

pub const EXTRACTION_SYSTEM: &str = "\
You are a precise medical CV data extractor. \
You MUST respond with valid JSON only — no markdown fences, no explanations. \
Never invent entries that are not present in the text.";

/// Instruction sent with every chunk. The chunk may start or end mid-entry;
/// partial entries are still extracted.
pub const EXTRACTION_INSTRUCTION: &str = r#"Extract every career entry from the CV excerpt below into JSON.

OUTPUT SCHEMA (return exactly this structure, use [] for empty categories):
{
  "rotation": [{"title": "string", "hospital": "string", "date": "string", "level": "string"}],
  "procedure": [{"name": "string", "level": "string", "date": "string"}],
  "academic": [{"title": "string", "type": "audit" | "qip" | "research" | "teaching" | "publication", "date": "string"}],
  "registration": [{"body": "string", "number": "string", "date": "string"}],
  "education": [{"title": "string", "organization": "string", "date": "string"}]
}

RULES:
1. One object per entry; keep the source wording for titles.
2. If a field is not stated, omit it.
3. Return ONLY the JSON object — nothing else, no code fences."#;

/// The user message for one chunk.
pub fn chunk_prompt(instruction: &str, chunk: &str) -> String {
    format!("{instruction}\n\nCV EXCERPT:\n{chunk}")
}
