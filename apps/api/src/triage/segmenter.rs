//! Block Segmenter — groups extracted lines into CV entries.
//!
//! Two policies:
//! - `Paragraph`: split on blank-line paragraphs, or on single newlines when the
//!   text has no paragraph breaks at all.
//! - `HeaderDetection`: a line scan where date-led or section-keyword lines open a new entry.

use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::triage::classifier::Classifier;
use crate::triage::keywords::{normalize, KeywordConfig};
use crate::triage::models::{Block, Category, ClassifiedBlock, TextLine};

/// Blocks shorter than this (trimmed, in chars) are dropped under the paragraph policy.
pub const DEFAULT_MIN_BLOCK_CHARS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentPolicy {
    Paragraph,
    #[default]
    #[serde(alias = "header")]
    HeaderDetection,
}

impl FromStr for SegmentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paragraph" => Ok(SegmentPolicy::Paragraph),
            "header" | "header_detection" => Ok(SegmentPolicy::HeaderDetection),
            other => Err(format!(
                "unknown segment policy '{other}' (expected 'paragraph' or 'header')"
            )),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Paragraph policy
// ────────────────────────────────────────────────────────────────────────────

/// Splits `text` into blocks in source order.
///
/// Separator is `"\n\n"` if the text contains one, else `"\n"`. Blank lines inside a
/// piece are dropped; pieces whose trimmed text is shorter than `min_chars` are ignored.
pub fn paragraph_blocks(text: &str, min_chars: usize) -> Vec<Block> {
    let separator = if text.contains("\n\n") { "\n\n" } else { "\n" };
    let separator_lines = separator.len();

    let mut blocks = Vec::new();
    let mut line_cursor = 0;

    for piece in text.split(separator) {
        let lines: Vec<TextLine> = piece
            .split('\n')
            .enumerate()
            .map(|(i, raw)| TextLine::new(line_cursor + i, raw))
            .filter(|line| !line.is_blank())
            .collect();
        line_cursor += piece.matches('\n').count() + separator_lines;

        if let Some(block) = Block::from_lines(&lines) {
            if block.char_len() >= min_chars {
                blocks.push(block);
            }
        }
    }

    blocks
}

// ────────────────────────────────────────────────────────────────────────────
// Header-detection policy
// ────────────────────────────────────────────────────────────────────────────

/// Decides whether a line opens a new CV entry.
#[derive(Debug, Clone)]
pub struct HeaderDetector {
    date_lead: Regex,
    section_keywords: Vec<String>,
}

impl HeaderDetector {
    pub fn new(config: &KeywordConfig) -> Self {
        Self {
            // A 4-digit year, a month abbreviation, or Present/Current at the start of the line.
            date_lead: Regex::new(
                r"(?i)^(?:\d{4}|jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec|present|current)",
            )
            .expect("date lead pattern is valid"),
            section_keywords: normalize(&config.section_headers),
        }
    }

    pub fn is_header(&self, trimmed: &str) -> bool {
        if self.date_lead.is_match(trimmed) {
            return true;
        }
        let lowered = trimmed.to_lowercase();
        self.section_keywords
            .iter()
            .any(|k| lowered.contains(k.as_str()))
    }
}

/// The header-detection scan as an explicit state machine.
///
/// State is `{open_block, closed_blocks}`. A header line closes the open block (if any),
/// classifies it, and starts a new one with itself. Any other line is appended.
/// `finish` closes the leftover block as `rotation` regardless of its content; downstream
/// consumers rely on that default so it is kept.
#[derive(Debug)]
pub struct HeaderScanner<'a> {
    detector: &'a HeaderDetector,
    classifier: &'a Classifier,
    open_block: Vec<TextLine>,
    closed_blocks: Vec<ClassifiedBlock>,
}

impl<'a> HeaderScanner<'a> {
    pub fn new(detector: &'a HeaderDetector, classifier: &'a Classifier) -> Self {
        Self {
            detector,
            classifier,
            open_block: Vec::new(),
            closed_blocks: Vec::new(),
        }
    }

    /// Feeds one line. Blank lines are ignored.
    pub fn feed(&mut self, line: TextLine) {
        if line.is_blank() {
            return;
        }
        if self.detector.is_header(&line.trimmed) && !self.open_block.is_empty() {
            self.close_open_block();
        }
        self.open_block.push(line);
    }

    pub fn open_block(&self) -> &[TextLine] {
        &self.open_block
    }

    pub fn closed_blocks(&self) -> &[ClassifiedBlock] {
        &self.closed_blocks
    }

    /// Closes the leftover accumulator as `rotation` and returns all blocks in source order.
    pub fn finish(mut self) -> Vec<ClassifiedBlock> {
        if let Some(block) = Block::from_lines(&self.open_block) {
            self.closed_blocks.push(ClassifiedBlock {
                block,
                category: Category::Rotation,
            });
        }
        self.closed_blocks
    }

    fn close_open_block(&mut self) {
        let lines = std::mem::take(&mut self.open_block);
        if let Some(block) = Block::from_lines(&lines) {
            let category = self.classifier.classify(&block.text);
            self.closed_blocks.push(ClassifiedBlock { block, category });
        }
    }
}

/// Runs the header-detection scan over `lines`.
pub fn header_blocks(
    lines: impl IntoIterator<Item = TextLine>,
    detector: &HeaderDetector,
    classifier: &Classifier,
) -> Vec<ClassifiedBlock> {
    let mut scanner = HeaderScanner::new(detector, classifier);
    for line in lines {
        scanner.feed(line);
    }
    scanner.finish()
}
