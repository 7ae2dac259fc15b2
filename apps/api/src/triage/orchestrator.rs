//! Chunk Orchestrator — the assisted extraction path.
//!
//! Text is sliced into fixed-size chunks, each chunk goes to the extraction collaborator
//! one at a time, and partial category → records results are concatenated in chunk order.
//! A rate-limited chunk is retried with linearly growing backoff; any other failure drops
//! that chunk only. The document as a whole never fails.

use std::ops::ControlFlow;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::triage::chunker::{chunk_text, DEFAULT_CHUNK_SIZE};
use crate::triage::models::{Chunk, ExtractionRecord, TriageResult};
use crate::triage::records::parse_category_records;

// ────────────────────────────────────────────────────────────────────────────
// Collaborator seam
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionError {
    /// Quota or rate-limit signal. The chunk may be retried.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The collaborator answered, but not with the expected JSON shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// External structured-extraction service. Given an instruction and a chunk of CV text,
/// returns a JSON object whose keys are category names and whose values are lists of
/// flat records.
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    async fn extract(&self, instruction: &str, chunk: &str) -> Result<Value, ExtractionError>;
}

/// Outcome of a single attempt, separating retryable from terminal failures.
#[derive(Debug)]
enum Attempt {
    Success(TriageResult<ExtractionRecord>),
    Retryable(String),
    Terminal(String),
}

impl From<Result<Value, ExtractionError>> for Attempt {
    fn from(result: Result<Value, ExtractionError>) -> Self {
        match result {
            Ok(value) => match parse_category_records(value) {
                Ok(records) => Attempt::Success(records),
                Err(e) => Attempt::Terminal(e.to_string()),
            },
            Err(ExtractionError::RateLimited(msg)) => Attempt::Retryable(msg),
            Err(e) => Attempt::Terminal(e.to_string()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Bounded retry with linear backoff: the wait after failed attempt `n` is `n × backoff_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(failed_attempt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub chunk_size: usize,
    /// Pause between consecutive chunk calls, to stay under collaborator rate limits.
    pub inter_chunk_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            inter_chunk_delay: Duration::from_millis(1200),
            retry: RetryPolicy::default(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reporting
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkStatus {
    Merged { records: usize },
    RateLimitExhausted { last_error: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkReport {
    pub index: usize,
    pub char_offset: usize,
    pub chars: usize,
    pub attempts: u32,
    #[serde(flatten)]
    pub status: ChunkStatus,
}

/// Passed to the progress callback after every chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkProgress<'a> {
    pub completed: usize,
    pub total: usize,
    pub report: &'a ChunkReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistedOutcome {
    pub result: TriageResult<ExtractionRecord>,
    pub chunks: Vec<ChunkReport>,
    pub total_chunks: usize,
    /// True when the progress callback stopped the run before every chunk was issued.
    pub cancelled: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

pub struct ChunkOrchestrator<'a> {
    extractor: &'a dyn StructuredExtractor,
    instruction: &'a str,
    config: OrchestratorConfig,
}

impl<'a> ChunkOrchestrator<'a> {
    pub fn new(
        extractor: &'a dyn StructuredExtractor,
        instruction: &'a str,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            extractor,
            instruction,
            config,
        }
    }

    /// Runs every chunk sequentially and merges the results, reporting after each chunk.
    /// Returning `ControlFlow::Break` from `on_progress` stops before the next chunk is
    /// issued; records merged so far are kept.
    pub async fn run_with_progress<F>(&self, text: &str, mut on_progress: F) -> AssistedOutcome
    where
        F: FnMut(ChunkProgress<'_>) -> ControlFlow<()>,
    {
        let chunks = chunk_text(text, self.config.chunk_size);
        let total = chunks.len();
        let mut merged = TriageResult::new();
        let mut reports = Vec::with_capacity(total);
        let mut cancelled = false;

        info!(
            "Assisted extraction: {} chars in {} chunks",
            text.chars().count(),
            total
        );

        for (position, chunk) in chunks.iter().enumerate() {
            if position > 0 && !self.config.inter_chunk_delay.is_zero() {
                tokio::time::sleep(self.config.inter_chunk_delay).await;
            }

            let (report, records) = self.process_chunk(chunk).await;
            if let Some(records) = records {
                merged.merge(records);
            }
            reports.push(report);

            let progress = ChunkProgress {
                completed: position + 1,
                total,
                report: &reports[position],
            };
            if on_progress(progress).is_break() && position + 1 < total {
                info!("Assisted extraction stopped after chunk {}/{}", position + 1, total);
                cancelled = true;
                break;
            }
        }

        AssistedOutcome {
            result: merged,
            chunks: reports,
            total_chunks: total,
            cancelled,
        }
    }

    async fn process_chunk(
        &self,
        chunk: &Chunk,
    ) -> (ChunkReport, Option<TriageResult<ExtractionRecord>>) {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 0;

        let (status, records) = loop {
            attempt += 1;
            let outcome: Attempt = self
                .extractor
                .extract(self.instruction, &chunk.text)
                .await
                .into();

            match outcome {
                Attempt::Success(records) => {
                    let count = records.total();
                    info!(chunk = chunk.index, attempt, records = count, "Chunk merged");
                    break (ChunkStatus::Merged { records: count }, Some(records));
                }
                Attempt::Retryable(msg) if attempt < max_attempts => {
                    let delay = self.config.retry.delay_after(attempt);
                    warn!(
                        chunk = chunk.index,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, retrying chunk: {msg}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Attempt::Retryable(msg) => {
                    warn!(
                        chunk = chunk.index,
                        attempt,
                        "Rate limit retries exhausted, dropping chunk: {msg}"
                    );
                    break (ChunkStatus::RateLimitExhausted { last_error: msg }, None);
                }
                Attempt::Terminal(error) => {
                    warn!(
                        chunk = chunk.index,
                        attempt,
                        "Chunk extraction failed, dropping chunk: {error}"
                    );
                    break (ChunkStatus::Failed { error }, None);
                }
            }
        };

        let report = ChunkReport {
            index: chunk.index,
            char_offset: chunk.char_offset,
            chars: chunk.text.chars().count(),
            attempts: attempt,
            status,
        };
        (report, records)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::triage::models::Category;

    /// Replays scripted responses in call order and records every chunk it was sent.
    struct ScriptedExtractor {
        responses: Mutex<VecDeque<Result<Value, ExtractionError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedExtractor {
        fn new(responses: Vec<Result<Value, ExtractionError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StructuredExtractor for ScriptedExtractor {
        async fn extract(&self, _instruction: &str, chunk: &str) -> Result<Value, ExtractionError> {
            self.calls.lock().unwrap().push(chunk.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({})))
        }
    }

    async fn run_all(orchestrator: &ChunkOrchestrator<'_>, text: &str) -> AssistedOutcome {
        orchestrator
            .run_with_progress(text, |_| ControlFlow::Continue(()))
            .await
    }

    fn rate_limited() -> Result<Value, ExtractionError> {
        Err(ExtractionError::RateLimited("429 RESOURCE_EXHAUSTED".to_string()))
    }

    fn config(chunk_size: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            chunk_size,
            inter_chunk_delay: Duration::from_millis(1000),
            retry: RetryPolicy {
                max_attempts: 3,
                backoff_step: Duration::from_millis(2000),
            },
        }
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_step: Duration::from_millis(u64::MAX),
        };
        assert_eq!(policy.delay_after(2), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_twice_then_success_merges_once() {
        let extractor = ScriptedExtractor::new(vec![
            rate_limited(),
            rate_limited(),
            Ok(json!({"rotation": [{"title": "FY2 Emergency Medicine"}]})),
        ]);
        let orchestrator = ChunkOrchestrator::new(&extractor, "extract", config(100));

        let started = Instant::now();
        let outcome = run_all(&orchestrator, "short cv").await;

        assert_eq!(outcome.result.get(Category::Rotation).len(), 1);
        assert_eq!(outcome.result.total(), 1);
        assert_eq!(outcome.chunks[0].attempts, 3);
        assert_eq!(outcome.chunks[0].status, ChunkStatus::Merged { records: 1 });
        assert_eq!(extractor.calls().len(), 3);
        // 2s after attempt 1, 4s after attempt 2
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_drops_only_that_chunk() {
        let extractor = ScriptedExtractor::new(vec![
            rate_limited(),
            rate_limited(),
            rate_limited(),
            Ok(json!({"procedure": [{"name": "Cannula"}]})),
        ]);
        let orchestrator = ChunkOrchestrator::new(&extractor, "extract", config(5));

        let outcome = run_all(&orchestrator, "aaaaabbbbb").await;

        assert_eq!(outcome.total_chunks, 2);
        assert!(matches!(
            outcome.chunks[0].status,
            ChunkStatus::RateLimitExhausted { .. }
        ));
        assert_eq!(outcome.chunks[0].attempts, 3);
        assert_eq!(outcome.result.get(Category::Procedure).len(), 1);
        assert_eq!(extractor.calls(), vec!["aaaaa", "aaaaa", "aaaaa", "bbbbb"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_is_not_retried() {
        let extractor = ScriptedExtractor::new(vec![
            Err(ExtractionError::Failed("connection reset".to_string())),
            Ok(json!("not an object")),
            Ok(json!({"audit": [{"title": "Sepsis six"}]})),
        ]);
        let orchestrator = ChunkOrchestrator::new(&extractor, "extract", config(3));

        let outcome = run_all(&orchestrator, "abcdefghi").await;

        let attempts: Vec<_> = outcome.chunks.iter().map(|c| c.attempts).collect();
        assert_eq!(attempts, vec![1, 1, 1]);
        assert!(matches!(outcome.chunks[0].status, ChunkStatus::Failed { .. }));
        assert!(matches!(outcome.chunks[1].status, ChunkStatus::Failed { .. }));
        assert_eq!(outcome.result.get(Category::Academic).len(), 1);
        assert!(!outcome.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_concatenates_in_chunk_order() {
        let extractor = ScriptedExtractor::new(vec![
            Ok(json!({"rotation": [{"title": "A"}, {"title": "B"}]})),
            Ok(json!({"rotation": [{"title": "B"}], "registration": [{"body": "GMC"}]})),
        ]);
        let orchestrator = ChunkOrchestrator::new(&extractor, "extract", config(4));

        let outcome = run_all(&orchestrator, "12345678").await;

        let titles: Vec<_> = outcome
            .result
            .get(Category::Rotation)
            .iter()
            .map(|r| r.fields["title"].as_str().unwrap())
            .collect();
        // concatenated, not de-duplicated
        assert_eq!(titles, vec!["A", "B", "B"]);
        assert_eq!(outcome.result.get(Category::Registration).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_chunk_delay_between_calls_only() {
        let extractor = ScriptedExtractor::new(vec![]);
        let orchestrator = ChunkOrchestrator::new(&extractor, "extract", config(2));

        let started = Instant::now();
        run_all(&orchestrator, "abcdef").await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_break_stops_before_next_chunk() {
        let extractor = ScriptedExtractor::new(vec![]);
        let orchestrator = ChunkOrchestrator::new(&extractor, "extract", config(2));

        let mut seen = Vec::new();
        let outcome = orchestrator
            .run_with_progress("abcdef", |p| {
                seen.push((p.completed, p.total));
                if p.completed == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await;

        assert_eq!(seen, vec![(1, 3), (2, 3)]);
        assert!(outcome.cancelled);
        assert_eq!(outcome.chunks.len(), 2);
        assert_eq!(extractor.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_text_makes_no_calls() {
        let extractor = ScriptedExtractor::new(vec![]);
        let orchestrator = ChunkOrchestrator::new(&extractor, "extract", config(10));

        let outcome = run_all(&orchestrator, "").await;

        assert!(outcome.result.is_empty());
        assert_eq!(outcome.total_chunks, 0);
        assert!(extractor.calls().is_empty());
    }

    #[test]
    fn test_chunk_report_serializes_flat() {
        let report = ChunkReport {
            index: 0,
            char_offset: 0,
            chars: 10,
            attempts: 2,
            status: ChunkStatus::Merged { records: 4 },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "merged");
        assert_eq!(json["records"], 4);
    }
}
