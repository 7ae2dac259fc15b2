use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::triage::chunker::DEFAULT_CHUNK_SIZE;
use crate::triage::orchestrator::{OrchestratorConfig, RetryPolicy};
use crate::triage::segmenter::{SegmentPolicy, DEFAULT_MIN_BLOCK_CHARS};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Assisted extraction is disabled when unset.
    pub anthropic_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub triage: TriageSettings,
}

/// Tunables for the triage pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TriageSettings {
    pub segment_policy: SegmentPolicy,
    pub min_block_chars: usize,
    pub chunk_size: usize,
    pub chunk_delay_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// JSON keyword vocabulary. Built-in default when unset.
    pub keywords_path: Option<String>,
    /// JSON equivalency table. Built-in default when unset.
    pub equivalency_path: Option<String>,
}

impl Default for TriageSettings {
    fn default() -> Self {
        Self {
            segment_policy: SegmentPolicy::default(),
            min_block_chars: DEFAULT_MIN_BLOCK_CHARS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay_ms: 1200,
            retry_max_attempts: 3,
            retry_backoff_ms: 2000,
            keywords_path: None,
            equivalency_path: None,
        }
    }
}

impl TriageSettings {
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            chunk_size: self.chunk_size,
            inter_chunk_delay: Duration::from_millis(self.chunk_delay_ms),
            retry: RetryPolicy {
                max_attempts: self.retry_max_attempts,
                backoff_step: Duration::from_millis(self.retry_backoff_ms),
            },
        }
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            segment_policy: parse_or("SEGMENT_POLICY", &lookup, defaults.segment_policy)?,
            min_block_chars: parse_or("MIN_BLOCK_CHARS", &lookup, defaults.min_block_chars)?,
            chunk_size: parse_or("CHUNK_SIZE", &lookup, defaults.chunk_size)?,
            chunk_delay_ms: parse_or("CHUNK_DELAY_MS", &lookup, defaults.chunk_delay_ms)?,
            retry_max_attempts: parse_or(
                "RETRY_MAX_ATTEMPTS",
                &lookup,
                defaults.retry_max_attempts,
            )?,
            retry_backoff_ms: parse_or("RETRY_BACKOFF_MS", &lookup, defaults.retry_backoff_ms)?,
            keywords_path: lookup("KEYWORDS_PATH"),
            equivalency_path: lookup("EQUIVALENCY_PATH"),
        };

        // Zero would mean one collaborator call per character, or no call at all.
        anyhow::ensure!(settings.chunk_size > 0, "CHUNK_SIZE must be at least 1");
        anyhow::ensure!(
            settings.retry_max_attempts > 0,
            "RETRY_MAX_ATTEMPTS must be at least 1"
        );
        Ok(settings)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            triage: TriageSettings::from_lookup(|key| std::env::var(key).ok())?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<T>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} is invalid ({raw:?}): {e}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<TriageSettings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TriageSettings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(settings(&[]).unwrap(), TriageSettings::default());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let s = settings(&[
            ("SEGMENT_POLICY", "paragraph"),
            ("CHUNK_SIZE", "2000"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("KEYWORDS_PATH", "/etc/passport/keywords.json"),
        ])
        .unwrap();
        assert_eq!(s.segment_policy, SegmentPolicy::Paragraph);
        assert_eq!(s.chunk_size, 2000);
        assert_eq!(s.orchestrator().retry.max_attempts, 5);
        assert_eq!(s.keywords_path.as_deref(), Some("/etc/passport/keywords.json"));
    }

    #[test]
    fn test_invalid_value_names_the_variable() {
        let err = settings(&[("CHUNK_SIZE", "big")]).unwrap_err();
        assert!(err.to_string().contains("CHUNK_SIZE"));
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let err = settings(&[("CHUNK_SIZE", "0")]).unwrap_err();
        assert!(err.to_string().contains("CHUNK_SIZE"));
    }

    #[test]
    fn test_zero_retry_attempts_is_rejected() {
        let err = settings(&[("RETRY_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(err.to_string().contains("RETRY_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_orchestrator_config_uses_millis() {
        let s = TriageSettings::default();
        let orchestrator = s.orchestrator();
        assert_eq!(orchestrator.inter_chunk_delay, Duration::from_millis(1200));
        assert_eq!(orchestrator.retry.backoff_step, Duration::from_secs(2));
        assert_eq!(orchestrator.chunk_size, 2500);
    }
}
