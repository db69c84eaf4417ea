//! Search request and outcome models.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Paper;
use crate::sources::SourceError;

/// One adapter call: what to look for and how long each network attempt may take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Search terms, already trimmed
    pub query: String,

    /// Number of records wanted; adapters cap this to their own maximum
    pub limit: usize,

    /// Connect timeout for a single attempt
    pub connect_timeout: Duration,

    /// Read timeout for a single attempt (whole request, body included)
    pub read_timeout: Duration,
}

impl FetchRequest {
    /// Create a new fetch request with default timeouts
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            limit,
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(6),
        }
    }

    /// Set per-attempt timeouts
    pub fn timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Check the adapter preconditions: non-empty query, positive limit
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.query.trim().is_empty() {
            return Err(SourceError::InvalidRequest("empty query".to_string()));
        }
        if self.limit == 0 {
            return Err(SourceError::InvalidRequest("limit must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The request size to send to a provider that serves at most `max` records per call
    pub fn capped_limit(&self, max: usize) -> usize {
        self.limit.min(max).max(1)
    }
}

/// What one provider produced during a search: papers or an error, never both
#[derive(Debug)]
pub struct ProviderResult {
    /// Provider id
    pub source: String,

    /// Papers on success, the provider's error otherwise
    pub outcome: Result<Vec<Paper>, SourceError>,
}

impl ProviderResult {
    pub fn new(source: impl Into<String>, outcome: Result<Vec<Paper>, SourceError>) -> Self {
        Self {
            source: source.into(),
            outcome,
        }
    }

    /// Whether the provider succeeded with at least one paper
    pub fn has_papers(&self) -> bool {
        matches!(&self.outcome, Ok(papers) if !papers.is_empty())
    }
}

/// Why a search failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The query was rejected before any provider was called
    Validation,
    /// Every configured provider errored or timed out
    AllSourcesFailed,
}

/// A provider that contributed nothing because it failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Successful search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSuccess {
    /// Deduplicated, ranked papers (at most `limit`)
    pub papers: Vec<Paper>,

    /// Providers with at least one paper in `papers`, in priority order
    pub sources_used: Vec<String>,

    /// Providers that failed during this search (partial success)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_sources: Vec<SourceFailure>,

    /// Whether the result was served from the cache
    pub cached: bool,
}

/// Failed search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFailure {
    pub kind: FailureKind,
    pub message: String,

    /// Remediation hints for the caller
    pub suggestions: Vec<String>,

    /// Per-provider errors, for aggregate failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_errors: Vec<SourceFailure>,
}

impl SearchFailure {
    /// Query rejected before any provider call
    pub fn validation(message: impl Into<String>, min_query_len: usize) -> Self {
        Self {
            kind: FailureKind::Validation,
            message: message.into(),
            suggestions: vec![format!(
                "Use a search query of at least {} characters",
                min_query_len
            )],
            source_errors: Vec::new(),
        }
    }

    /// Every provider failed
    pub fn all_sources_failed(source_errors: Vec<SourceFailure>) -> Self {
        Self {
            kind: FailureKind::AllSourcesFailed,
            message: "All search methods failed".to_string(),
            suggestions: vec![
                "Check your internet connection".to_string(),
                "Try more specific search terms".to_string(),
                "Verify search services are available".to_string(),
            ],
            source_errors,
        }
    }
}

/// Result of `Orchestrator::search`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Success(SearchSuccess),
    Failure(SearchFailure),
}

impl SearchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SearchOutcome::Success(_))
    }

    /// Papers of a successful search; empty for failures
    pub fn papers(&self) -> &[Paper] {
        match self {
            SearchOutcome::Success(success) => &success.papers,
            SearchOutcome::Failure(_) => &[],
        }
    }

    /// Providers that contributed; empty for failures
    pub fn sources_used(&self) -> &[String] {
        match self {
            SearchOutcome::Success(success) => &success.sources_used,
            SearchOutcome::Failure(_) => &[],
        }
    }

    /// The failure kind, if the search failed
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            SearchOutcome::Success(_) => None,
            SearchOutcome::Failure(failure) => Some(failure.kind),
        }
    }
}
