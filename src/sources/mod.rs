//! Provider adapters behind one trait-based fetch contract.
//!
//! This module defines the [`Source`] trait that every provider adapter
//! implements. The orchestrator only ever talks to `dyn Source`; adding a
//! provider means adding an adapter and a registry entry, never touching the
//! search engine.
//!
//! # Feature Flags
//!
//! Individual adapters can be left out at compile time using Cargo features:
//!
//! - `openalex` - OpenAlex works API (default: enabled)
//! - `arxiv` - arXiv Atom API with mirrored endpoints (default: enabled)
//! - `crossref` - CrossRef works API (default: enabled)
//! - `europe_pmc` - Europe PMC REST search (default: enabled)
//! - `doaj` - Directory of Open Access Journals article search (default: enabled)
//! - `pubmed` - NCBI E-utilities ESearch + ESummary (default: enabled)
//! - `pygetpapers` - the `pygetpapers` command-line harvester (default: enabled)
//!
//! DOAJ, PubMed and the harvester are compiled in but only queried when listed
//! in `sources.order`.
//!
//! # Runtime Source Configuration
//!
//! Compiled-in adapters are selected and ordered by `sources.order`:
//!
//! ```bash
//! # Query arXiv before OpenAlex, skip the rest
//! export RESEARCH_AGGREGATOR_SOURCES__ORDER="arxiv,openalex"
//! ```

#[cfg(feature = "source-arxiv")]
mod arxiv;
#[cfg(feature = "source-crossref")]
mod crossref;
#[cfg(feature = "source-doaj")]
mod doaj;
#[cfg(feature = "source-europe_pmc")]
mod europe_pmc;
#[cfg(feature = "source-openalex")]
mod openalex;
#[cfg(feature = "source-pubmed")]
mod pubmed;
#[cfg(feature = "source-pygetpapers")]
mod pygetpapers;
mod registry;

pub mod mock;

#[cfg(feature = "source-arxiv")]
pub use arxiv::ArxivSource;
#[cfg(feature = "source-crossref")]
pub use crossref::CrossRefSource;
#[cfg(feature = "source-doaj")]
pub use doaj::DoajSource;
#[cfg(feature = "source-europe_pmc")]
pub use europe_pmc::EuropePmcSource;
pub use mock::MockSource;
#[cfg(feature = "source-openalex")]
pub use openalex::OpenAlexSource;
#[cfg(feature = "source-pubmed")]
pub use pubmed::PubMedSource;
#[cfg(feature = "source-pygetpapers")]
pub use pygetpapers::PygetpapersSource;
pub use registry::{build_source, SourceRegistry, KNOWN_SOURCES};

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::models::{FetchRequest, Paper};
use crate::utils::RetryConfig;

/// The provider adapter contract.
///
/// # Implementing a New Source
///
/// 1. Create a struct that implements `Source`
/// 2. Validate the [`FetchRequest`] and cap its limit to [`Source::max_results`]
/// 3. Retry transient failures with [`crate::utils::with_retry`]; return
///    permanent failures immediately
/// 4. Map raw records through [`crate::utils::normalize`], skipping bad ones
/// 5. Add the adapter to [`build_source`]
#[async_trait]
pub trait Source: Send + Sync + fmt::Debug {
    /// Unique identifier for this source (e.g. "openalex", "arxiv")
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Largest request size the provider serves in one call
    fn max_results(&self) -> usize {
        50
    }

    /// Fetch papers matching the request.
    ///
    /// An empty `Ok` means the provider genuinely found nothing.
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Paper>, SourceError>;

    /// Report whether the provider can currently be used. Never performs a search.
    async fn health(&self) -> SourceHealth {
        SourceHealth::Available
    }
}

/// Availability reported by [`Source::health`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceHealth {
    Available,
    Unavailable,
}

impl SourceHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceHealth::Available => "available",
            SourceHealth::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for SourceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings shared by every adapter built from configuration
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Per-adapter retry policy
    pub retry: RetryConfig,

    /// Client-side throttle per adapter; 0 disables it
    pub requests_per_second: u32,

    /// Email for the OpenAlex polite pool
    pub openalex_email: Option<String>,

    /// Upper bound on one run of an external harvester process
    pub process_timeout: Duration,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            requests_per_second: 5,
            openalex_email: None,
            process_timeout: Duration::from_secs(60),
        }
    }
}

/// Errors that can occur when fetching from a source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Connection could not be established or was reset
    #[error("Network error: {0}")]
    Network(String),

    /// A single attempt exceeded its connect or read timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Provider answered with a 5xx status
    #[error("Server error: HTTP {0}")]
    Server(u16),

    /// Provider answered with 429
    #[error("Rate limited by provider")]
    RateLimited,

    /// Provider answered with a 4xx status other than 429
    #[error("Client error: HTTP {0}")]
    Client(u16),

    /// The response envelope could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The external harvester process failed
    #[error("Process error: {0}")]
    Process(String),

    /// The provider cannot be used at all
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// The provider did not finish before the overall search deadline
    #[error("Search deadline exceeded")]
    Deadline,

    /// IO error (file system)
    #[error("IO error: {0}")]
    Io(String),
}

impl SourceError {
    /// Whether the failure may go away on a retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Network(_)
                | SourceError::Timeout(_)
                | SourceError::Server(_)
                | SourceError::RateLimited
        )
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => SourceError::RateLimited,
            500..=599 => SourceError::Server(status),
            _ => SourceError::Client(status),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(err.to_string())
        } else if err.is_connect() {
            SourceError::Network(err.to_string())
        } else if let Some(status) = err.status() {
            SourceError::from_status(status.as_u16())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}
