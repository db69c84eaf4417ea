//! # Research Aggregator
//!
//! Searches academic paper metadata across several unreliable providers and
//! merges the answers into one deduplicated, recency-ranked result set.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (Paper, FetchRequest, SearchOutcome)
//! - [`sources`]: Provider adapters behind the [`Source`] trait
//! - [`engine`]: Fan-out and fallback strategies and the [`Orchestrator`]
//! - [`utils`]: Normalization, deduplication, ranking, caching, HTTP and retry
//! - [`config`]: Configuration management
//!
//! ## Example
//!
//! ```no_run
//! use research_aggregator::config::Config;
//! use research_aggregator::Orchestrator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::from_config(&Config::default())?;
//! let outcome = orchestrator.search("graphene", 10).await;
//! for paper in outcome.papers() {
//!     println!("{} ({})", paper.title, paper.year);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod models;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use engine::{Orchestrator, SearchOptions, Strategy};
pub use models::{Paper, SearchOutcome};
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
