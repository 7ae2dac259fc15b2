//! Text Extractor — turns an uploaded PDF or DOCX into plain text.
//!
//! Every failure maps to an empty string. Callers treat empty output as "no data".

use std::io::{Cursor, Read};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::triage::models::{DocumentFormat, RawDocument, TextLine};

const DOCX_BODY_PART: &str = "word/document.xml";

/// Extracts the full plain-text content of a document, or `""` if it cannot be read.
pub fn extract_text(document: &RawDocument) -> String {
    let result = match document.format {
        DocumentFormat::Pdf => extract_pdf(&document.data),
        DocumentFormat::Docx => extract_docx(&document.data),
    };

    match result {
        Ok(text) => {
            let text = normalize_newlines(&text);
            debug!(
                "Extracted {} chars from {:?} document",
                text.chars().count(),
                document.format
            );
            text
        }
        Err(e) => {
            warn!("Text extraction failed for {:?} document: {e}", document.format);
            String::new()
        }
    }
}

/// Splits extracted text into 0-indexed lines.
pub fn to_lines(text: &str) -> Vec<TextLine> {
    text.lines()
        .enumerate()
        .map(|(number, raw)| TextLine::new(number, raw))
        .collect()
}

fn extract_pdf(data: &[u8]) -> Result<String, String> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(data)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("PDF parser panicked".to_string()),
    }
}

fn extract_docx(data: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).map_err(|e| e.to_string())?;
    let mut part = archive
        .by_name(DOCX_BODY_PART)
        .map_err(|e| format!("{DOCX_BODY_PART}: {e}"))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml).map_err(|e| e.to_string())?;
    Ok(docx_xml_to_text(&xml))
}

fn docx_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>",
            r"|</w:p>|<w:p\s*/>|<w:p\s[^>]*/>",
            r"|<w:tab\s*/>|<w:br\s*/>|<w:cr\s*/>",
        ))
        .expect("docx token pattern is valid")
    })
}

/// Flattens WordprocessingML into text: one line per paragraph, runs concatenated.
fn docx_xml_to_text(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len() / 4);
    for cap in docx_token_pattern().captures_iter(xml) {
        if let Some(run) = cap.get(1) {
            out.push_str(&unescape_xml(run.as_str()));
            continue;
        }
        match cap.get(0).map(|m| m.as_str()) {
            Some(tag) if tag.starts_with("<w:tab") => out.push('\t'),
            _ => out.push('\n'),
        }
    }
    out
}

fn entity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"&(lt|gt|quot|apos|amp|#[0-9]+|#[xX][0-9a-fA-F]+);")
            .expect("entity pattern is valid")
    })
}

/// Decodes the predefined XML entities and numeric character references in one pass.
/// Unknown or out-of-range references are left as written.
fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    entity_pattern()
        .replace_all(s, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = match name {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => {
                    let number = &name[1..];
                    let code = match number.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => number.parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Folds `\r\n` and lone `\r` into `\n`.
pub(crate) fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
