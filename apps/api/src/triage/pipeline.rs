//! End-to-end triage.
//!
//! Heuristic path: extract → segment → classify.
//! Assisted path: extract → chunk → per-chunk external extraction → merge.

use std::ops::ControlFlow;

use tracing::info;

use crate::triage::classifier::Classifier;
use crate::triage::extractor::{extract_text, normalize_newlines, to_lines};
use crate::triage::keywords::KeywordConfig;
use crate::triage::models::{Block, Category, RawDocument, TriageResult};
use crate::triage::orchestrator::{
    AssistedOutcome, ChunkOrchestrator, ChunkProgress, OrchestratorConfig, StructuredExtractor,
};
use crate::triage::prompts::EXTRACTION_INSTRUCTION;
use crate::triage::segmenter::{
    header_blocks, paragraph_blocks, HeaderDetector, SegmentPolicy, DEFAULT_MIN_BLOCK_CHARS,
};

/// Everything the heuristic path needs, built once from a keyword vocabulary.
#[derive(Debug, Clone)]
pub struct HeuristicTriage {
    classifier: Classifier,
    detector: HeaderDetector,
    policy: SegmentPolicy,
    min_block_chars: usize,
}

impl HeuristicTriage {
    pub fn new(keywords: &KeywordConfig, policy: SegmentPolicy, min_block_chars: usize) -> Self {
        Self {
            classifier: Classifier::new(keywords),
            detector: HeaderDetector::new(keywords),
            policy,
            min_block_chars,
        }
    }

    pub fn policy(&self) -> SegmentPolicy {
        self.policy
    }

    /// Categories the classifier can emit, in priority order.
    pub fn categories(&self) -> Vec<Category> {
        self.classifier.categories()
    }

    /// Same vocabulary, different segmentation policy.
    pub fn with_policy(&self, policy: SegmentPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    /// Triages already-extracted text. Empty text yields an empty result.
    pub fn triage_text(&self, text: &str) -> TriageResult<Block> {
        let text = normalize_newlines(text);
        let text = text.as_str();
        let mut result = TriageResult::new();

        match self.policy {
            SegmentPolicy::Paragraph => {
                for block in paragraph_blocks(text, self.min_block_chars) {
                    let category = self.classifier.classify(&block.text);
                    result.push(category, block);
                }
            }
            SegmentPolicy::HeaderDetection => {
                for classified in header_blocks(to_lines(text), &self.detector, &self.classifier) {
                    result.push(classified.category, classified.block);
                }
            }
        }

        info!(
            "Heuristic triage ({:?}): {} blocks",
            self.policy,
            result.total()
        );
        result
    }

    pub fn triage_document(&self, document: &RawDocument) -> TriageResult<Block> {
        self.triage_text(&extract_text(document))
    }
}

impl Default for HeuristicTriage {
    fn default() -> Self {
        Self::new(
            &KeywordConfig::default(),
            SegmentPolicy::default(),
            DEFAULT_MIN_BLOCK_CHARS,
        )
    }
}

/// Runs the assisted path over already-extracted text.
pub async fn assisted_triage<F>(
    text: &str,
    extractor: &dyn StructuredExtractor,
    config: OrchestratorConfig,
    on_progress: F,
) -> AssistedOutcome
where
    F: FnMut(ChunkProgress<'_>) -> ControlFlow<()>,
{
    ChunkOrchestrator::new(extractor, EXTRACTION_INSTRUCTION, config)
        .run_with_progress(text, on_progress)
        .await
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::{json, Value};

    use super::*;
    use crate::triage::models::DocumentFormat;
    use crate::triage::orchestrator::ExtractionError;

    const SAMPLE_CV: &str = "\
CLINICAL EXPERIENCE
Aug 2022 - Present
Core Trainee, Acute Medicine, Royal London Hospital
2020 - 2022 Foundation Programme
Barts Health NHS Trust
2021 Audit of sepsis management, GMC reflective practice
Procedures: arterial blood gas, cannula, lumbar puncture
2019 ALS course, Resuscitation Council";

    fn paragraph() -> HeuristicTriage {
        HeuristicTriage::default().with_policy(SegmentPolicy::Paragraph)
    }

    #[test]
    fn test_scenario_registration_wins_over_audit() {
        let result = paragraph().triage_text("Audit of sepsis management, GMC reflective practice");
        assert_eq!(result.get(Category::Registration).len(), 1);
        assert_eq!(result.total(), 1);
    }

    #[test]
    fn test_scenario_no_headers_single_rotation_block() {
        let text = "Worked nights on surgical wards\nLed handovers\nSupervised juniors";
        let result = HeuristicTriage::default().triage_text(text);
        assert_eq!(result.total(), 1);
        assert_eq!(result.get(Category::Rotation)[0].text, text);
    }

    #[test]
    fn test_header_policy_on_sample_cv() {
        let result = HeuristicTriage::default().triage_text(SAMPLE_CV);
        // every line except "Procedures: ..." opens a new block
        assert_eq!(result.total(), 7);
        assert_eq!(result.get(Category::Rotation).len(), 6);
        let registration = &result.get(Category::Registration)[0];
        assert!(registration.text.contains("lumbar puncture"));
        // leftover block defaults to rotation even though it is a course
        let last = result.get(Category::Rotation).last().unwrap();
        assert!(last.header.starts_with("2019 ALS course"));
        assert!(result.get(Category::Education).is_empty());
        assert!(result.get(Category::Fragment).is_empty());
    }

    #[test]
    fn test_paragraph_policy_on_sample_cv() {
        let result = paragraph().triage_text(SAMPLE_CV);
        assert_eq!(result.total(), 8);
        assert_eq!(result.get(Category::Procedure).len(), 1);
        assert_eq!(result.get(Category::Education).len(), 1);
    }

    #[test]
    fn test_block_count_matches_segmenter() {
        let triage = paragraph();
        let text = "GMC full registration\n\nCannula x 40\n\nrandom notes\n\nok";
        let expected = paragraph_blocks(text, DEFAULT_MIN_BLOCK_CHARS).len();
        assert_eq!(triage.triage_text(text).total(), expected);
    }

    #[test]
    fn test_categories_end_with_fragment() {
        let categories = HeuristicTriage::default().categories();
        assert_eq!(categories.first(), Some(&Category::Registration));
        assert_eq!(categories.last(), Some(&Category::Fragment));
        assert!(categories.contains(&Category::Education));
    }

    #[test]
    fn test_crlf_text_segments_like_lf() {
        let lf = "GMC full registration\nNumber 1234567\n\nAudit of VTE\nRe-audit";
        let crlf = lf.replace('\n', "\r\n");
        for triage in [HeuristicTriage::default(), paragraph()] {
            assert_eq!(triage.triage_text(&crlf), triage.triage_text(lf));
        }
        let result = paragraph().triage_text(&crlf);
        assert_eq!(result.total(), 2);
        assert_eq!(result.get(Category::Registration).len(), 1);
        assert_eq!(result.get(Category::Academic).len(), 1);
    }

    #[test]
    fn test_empty_text_yields_empty_result() {
        for triage in [HeuristicTriage::default(), paragraph()] {
            let result = triage.triage_text("");
            assert!(result.is_empty());
        }
    }

    #[test]
    fn test_unreadable_document_yields_empty_result() {
        let document = RawDocument {
            data: Bytes::from_static(b"%PDF-broken"),
            format: DocumentFormat::Pdf,
        };
        assert!(HeuristicTriage::default().triage_document(&document).is_empty());
    }

    #[test]
    fn test_heuristic_triage_is_idempotent() {
        for triage in [HeuristicTriage::default(), paragraph()] {
            let first = triage.triage_text(SAMPLE_CV);
            let second = triage.triage_text(SAMPLE_CV);
            assert_eq!(first, second);
        }
    }

    struct FixedExtractor;

    #[async_trait]
    impl StructuredExtractor for FixedExtractor {
        async fn extract(&self, instruction: &str, _chunk: &str) -> Result<Value, ExtractionError> {
            assert_eq!(instruction, EXTRACTION_INSTRUCTION);
            Ok(json!({"rotation": [{"title": "FY1"}]}))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_assisted_triage_merges_every_chunk() {
        let config = OrchestratorConfig {
            chunk_size: 100,
            ..OrchestratorConfig::default()
        };
        let text = "x".repeat(250);
        let outcome =
            assisted_triage(&text, &FixedExtractor, config, |_| ControlFlow::Continue(())).await;
        assert_eq!(outcome.total_chunks, 3);
        assert_eq!(outcome.result.get(Category::Rotation).len(), 3);
    }
}
