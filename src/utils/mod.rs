//! Building blocks of the search pipeline.
//!
//! - [`normalize`]: map provider records into [`crate::models::Paper`]
//! - [`dedupe`]: collapse papers sharing a (title, first author) key
//! - [`rank`]: order papers by recency
//! - [`SearchCache`]: short-TTL result cache with an injectable [`Clock`]
//! - [`HttpClient`]: per-attempt timeouts and client-side throttling
//! - [`with_retry`]: exponential backoff for transient provider errors
//!
//! # Deduplicate and rank
//!
//! ```rust
//! use research_aggregator::utils::{dedupe, rank};
//! use research_aggregator::models::Paper;
//!
//! # fn example(papers: Vec<Paper>) {
//! let ordered = rank(dedupe(papers));
//! # }
//! ```

mod cache;
mod dedup;
mod http;
mod normalize;
mod rank;
mod retry;

pub use cache::{
    CacheKey, CacheResult, CachedSearch, Clock, ManualClock, SearchCache, SystemClock, DEFAULT_TTL,
};
pub use dedup::{dedupe, DedupKey};
pub use http::{HttpClient, USER_AGENT};
pub use normalize::{normalize, normalize_values, reconstruct_abstract, year_of, RawRecord, NO_ABSTRACT};
pub use rank::{compare, rank};
pub use retry::{with_retry, RetryConfig};
