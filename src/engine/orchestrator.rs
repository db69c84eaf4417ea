//! The search entry point: validation, caching, provider execution and merging.

use futures_util::future::{join_all, BoxFuture, Shared};
use futures_util::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::strategy::{self, Strategy};
use crate::config::{Config, ConfigError};
use crate::models::{
    FetchRequest, ProviderResult, SearchFailure, SearchOutcome, SearchSuccess, SourceFailure,
};
use crate::sources::SourceRegistry;
use crate::utils::{dedupe, rank, CacheKey, CacheResult, CachedSearch, SearchCache};

type InFlight = Shared<BoxFuture<'static, SearchOutcome>>;

/// Knobs of one orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub strategy: Strategy,

    /// Upper bound on one search's provider phase
    pub deadline: Duration,

    /// Minimum trimmed query length, in characters
    pub min_query_len: usize,

    /// Requested limits are clamped to `1..=max_limit`
    pub max_limit: usize,

    /// Per-attempt connect timeout handed to adapters
    pub connect_timeout: Duration,

    /// Per-attempt read timeout handed to adapters
    pub read_timeout: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::FanOut,
            deadline: Duration::from_secs(15),
            min_query_len: 3,
            max_limit: 50,
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(6),
        }
    }
}

/// Searches the registered providers and merges their papers.
///
/// Cloning is cheap; clones share the cache and the in-flight table.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: SourceRegistry,
    options: SearchOptions,
    cache: Option<Arc<SearchCache>>,
    in_flight: Mutex<HashMap<CacheKey, InFlight>>,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let in_flight = self.in_flight.try_lock().map(|map| map.len()).ok();
        f.debug_struct("Inner")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("cache", &self.cache)
            .field("in_flight", &in_flight)
            .finish()
    }
}

/// Removes an in-flight entry when its spawned execution finishes or panics
struct InFlightGuard {
    inner: Arc<Inner>,
    key: CacheKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl Orchestrator {
    /// Create an orchestrator without a cache
    pub fn new(registry: SourceRegistry, options: SearchOptions) -> Self {
        Self::build(registry, options, None)
    }

    /// Create an orchestrator that reads and populates `cache`
    pub fn with_cache(registry: SourceRegistry, options: SearchOptions, cache: Arc<SearchCache>) -> Self {
        Self::build(registry, options, Some(cache))
    }

    /// Build the registry, options and cache described by a loaded config
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let registry = SourceRegistry::from_ids(&config.sources.order, &config.source_settings())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let options = config.search_options();

        Ok(if config.cache.enabled {
            let cache = SearchCache::with_ttl(Duration::from_secs(config.cache.ttl_seconds));
            Self::with_cache(registry, options, Arc::new(cache))
        } else {
            Self::new(registry, options)
        })
    }

    fn build(registry: SourceRegistry, options: SearchOptions, cache: Option<Arc<SearchCache>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                options,
                cache,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.inner.registry
    }

    pub fn options(&self) -> &SearchOptions {
        &self.inner.options
    }

    /// Search every configured provider for `query`.
    ///
    /// Never fails with an error: validation problems and total provider
    /// failure come back as [`SearchOutcome::Failure`]. The provider phase
    /// runs on a spawned task shared by identical concurrent searches, so
    /// dropping this future does not cancel it.
    pub async fn search(&self, query: &str, limit: usize) -> SearchOutcome {
        let options = &self.inner.options;
        let query = query.trim();

        if query.chars().count() < options.min_query_len {
            tracing::debug!(query, min_len = options.min_query_len, "Rejected short query");
            return SearchOutcome::Failure(SearchFailure::validation(
                format!(
                    "Query must be at least {} characters long",
                    options.min_query_len
                ),
                options.min_query_len,
            ));
        }

        let limit = limit.clamp(1, options.max_limit.max(1));
        let key = CacheKey::new(query, limit);

        if let Some(hit) = self.inner.cached(&key) {
            return hit;
        }

        let execution = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(existing) = in_flight.get(&key) {
                tracing::debug!(query, limit, "Joining in-flight search");
                existing.clone()
            } else if let Some(hit) = self.inner.cached(&key) {
                // Another execution finished between the first lookup and the lock
                return hit;
            } else {
                let guard = InFlightGuard {
                    inner: Arc::clone(&self.inner),
                    key: key.clone(),
                };
                let query = query.to_string();
                // Runs to completion even when every waiter is dropped
                let task = tokio::spawn(async move {
                    let outcome = guard.inner.execute(&query, limit, &guard.key).await;
                    drop(guard);
                    outcome
                });
                let execution = task
                    .map(|joined| {
                        joined.unwrap_or_else(|error| {
                            tracing::error!(%error, "Search task ended abnormally");
                            SearchOutcome::Failure(SearchFailure::all_sources_failed(Vec::new()))
                        })
                    })
                    .boxed()
                    .shared();
                in_flight.insert(key, execution.clone());
                execution
            }
        };

        execution.await
    }

    /// Availability of every configured provider, without searching
    pub async fn health_check(&self) -> BTreeMap<String, String> {
        let probes = self.inner.registry.all().iter().map(|source| async move {
            let health = source.health().await;
            tracing::debug!(source = source.id(), %health, "Health probe");
            (source.id().to_string(), health.to_string())
        });
        join_all(probes).await.into_iter().collect()
    }
}

impl Inner {
    fn cached(&self, key: &CacheKey) -> Option<SearchOutcome> {
        let cache = self.cache.as_ref()?;
        match cache.lookup(key) {
            CacheResult::Hit(hit) => {
                tracing::debug!(key = %key, papers = hit.papers.len(), "Cache hit");
                Some(SearchOutcome::Success(SearchSuccess {
                    papers: hit.papers,
                    sources_used: hit.sources_used,
                    failed_sources: Vec::new(),
                    cached: true,
                }))
            }
            CacheResult::Expired => {
                tracing::debug!(key = %key, "Cache entry expired");
                None
            }
            CacheResult::Miss => {
                tracing::debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    async fn execute(&self, query: &str, limit: usize, key: &CacheKey) -> SearchOutcome {
        let request = FetchRequest::new(query, limit)
            .timeouts(self.options.connect_timeout, self.options.read_timeout);

        tracing::info!(
            query,
            limit,
            strategy = %self.options.strategy,
            sources = self.registry.len(),
            "Searching providers"
        );

        let results = strategy::execute(
            self.options.strategy,
            self.registry.all(),
            &request,
            self.options.deadline,
        )
        .await;
        let outcome = merge_results(results, limit);

        match &outcome {
            SearchOutcome::Success(success) => {
                tracing::info!(
                    query,
                    papers = success.papers.len(),
                    sources_used = ?success.sources_used,
                    failed = success.failed_sources.len(),
                    "Search completed"
                );
                if let Some(cache) = &self.cache {
                    cache.put(
                        key.clone(),
                        CachedSearch {
                            papers: success.papers.clone(),
                            sources_used: success.sources_used.clone(),
                        },
                    );
                }
            }
            SearchOutcome::Failure(failure) => {
                tracing::warn!(query, errors = failure.source_errors.len(), "All providers failed");
            }
        }

        outcome
    }
}

/// Merge provider results into one outcome.
///
/// `results` must be in provider-priority order. Successful papers are
/// concatenated in that order, then deduplicated, truncated to `limit`,
/// ranked and truncated again. With no successful provider the outcome is an
/// aggregate failure; successful providers with zero papers give an empty
/// success.
pub fn merge_results(results: Vec<ProviderResult>, limit: usize) -> SearchOutcome {
    let mut papers = Vec::new();
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();

    for result in results {
        match result.outcome {
            Ok(found) => {
                papers.extend(found);
                succeeded.push(result.source);
            }
            Err(error) => failed.push(SourceFailure {
                source: result.source,
                error: error.to_string(),
            }),
        }
    }

    if succeeded.is_empty() {
        return SearchOutcome::Failure(SearchFailure::all_sources_failed(failed));
    }

    let mut papers = dedupe(papers);
    papers.truncate(limit);
    let mut papers = rank(papers);
    papers.truncate(limit);

    let sources_used = succeeded
        .into_iter()
        .filter(|id| papers.iter().any(|paper| paper.source.id() == id))
        .collect();

    SearchOutcome::Success(SearchSuccess {
        papers,
        sources_used,
        failed_sources: failed,
        cached: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureKind;
    use crate::sources::mock::make_paper;
    use crate::sources::{MockSource, SourceError};

    fn stamped(source: &str, papers: Vec<crate::models::Paper>) -> Vec<crate::models::Paper> {
        papers
            .into_iter()
            .map(|mut paper| {
                paper.source = crate::models::SourceType::from_id(source);
                paper
            })
            .collect()
    }

    #[test]
    fn test_merge_dedupes_in_priority_order() {
        let first = stamped(
            "openalex",
            vec![make_paper("a1", "Shared title", "Kim", "2020-01-01")],
        );
        let second = stamped(
            "arxiv",
            vec![
                make_paper("b1", "Shared title", "Kim", "2023-01-01"),
                make_paper("b2", "Other", "Lee", "2019"),
            ],
        );

        let outcome = merge_results(
            vec![
                ProviderResult::new("openalex", Ok(first)),
                ProviderResult::new("arxiv", Ok(second)),
            ],
            10,
        );

        let papers = outcome.papers();
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].id, "a1");
        assert_eq!(outcome.sources_used(), ["openalex", "arxiv"]);
    }

    #[test]
    fn test_merge_truncates_before_ranking() {
        // The newest paper sits beyond the limit and must not be ranked back in
        let papers = stamped(
            "openalex",
            vec![
                make_paper("1", "Old", "A", "2001"),
                make_paper("2", "Older", "B", "2000"),
                make_paper("3", "Newest", "C", "2024"),
            ],
        );

        let outcome = merge_results(vec![ProviderResult::new("openalex", Ok(papers))], 2);
        let ids: Vec<_> = outcome.papers().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_merge_omits_sources_without_surviving_papers() {
        let outcome = merge_results(
            vec![
                ProviderResult::new("openalex", Ok(stamped("openalex", vec![make_paper("1", "T", "A", "2020")]))),
                ProviderResult::new("arxiv", Ok(Vec::new())),
                ProviderResult::new("crossref", Err(SourceError::Server(503))),
            ],
            10,
        );

        match outcome {
            SearchOutcome::Success(success) => {
                assert_eq!(success.sources_used, vec!["openalex"]);
                assert_eq!(success.failed_sources.len(), 1);
                assert_eq!(success.failed_sources[0].source, "crossref");
            }
            SearchOutcome::Failure(failure) => panic!("unexpected failure: {:?}", failure),
        }
    }

    #[test]
    fn test_merge_all_failed() {
        let outcome = merge_results(
            vec![
                ProviderResult::new("openalex", Err(SourceError::Timeout("slow".into()))),
                ProviderResult::new("arxiv", Err(SourceError::Deadline)),
            ],
            10,
        );

        assert_eq!(outcome.failure_kind(), Some(FailureKind::AllSourcesFailed));
        if let SearchOutcome::Failure(failure) = outcome {
            assert_eq!(failure.source_errors.len(), 2);
        }
    }

    #[test]
    fn test_merge_empty_successes_are_not_failures() {
        let outcome = merge_results(vec![ProviderResult::new("openalex", Ok(Vec::new()))], 10);
        assert!(outcome.is_success());
        assert!(outcome.papers().is_empty());
        assert!(outcome.sources_used().is_empty());
    }

    #[tokio::test]
    async fn test_validation_is_counted_in_characters() {
        let mock = Arc::new(MockSource::with_papers("openalex", vec![make_paper("1", "T", "A", "2020")]));
        let orchestrator = Orchestrator::new(
            SourceRegistry::new().with(mock.clone()),
            SearchOptions::default(),
        );

        let short = orchestrator.search("  é  ", 10).await;
        assert_eq!(short.failure_kind(), Some(FailureKind::Validation));

        let accented = orchestrator.search("ééé", 10).await;
        assert!(accented.is_success());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let papers = (0..60)
            .map(|i| make_paper(&i.to_string(), &format!("Title {}", i), "A", "2020"))
            .collect();
        let orchestrator = Orchestrator::new(
            SourceRegistry::new().with(Arc::new(MockSource::with_papers("openalex", papers))),
            SearchOptions::default(),
        );

        assert_eq!(orchestrator.search("graphene", 500).await.papers().len(), 50);
        assert_eq!(orchestrator.search("graphene", 0).await.papers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_search_does_not_leave_stale_execution() {
        let slow = Arc::new(
            MockSource::with_papers("openalex", vec![make_paper("1", "T", "A", "2020")])
                .delay(Duration::from_secs(1)),
        );
        let orchestrator = Orchestrator::new(
            SourceRegistry::new().with(slow.clone()),
            SearchOptions::default(),
        );

        let abandoned = tokio::time::timeout(Duration::from_millis(10), orchestrator.search("graphene", 10)).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert!(orchestrator.inner.in_flight.lock().unwrap().is_empty());

        let outcome = orchestrator.search("graphene", 10).await;
        assert!(outcome.is_success());
        assert_eq!(slow.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_search_still_populates_cache() {
        let slow = Arc::new(
            MockSource::with_papers("openalex", vec![make_paper("1", "T", "A", "2020")])
                .delay(Duration::from_secs(1)),
        );
        let cache = Arc::new(SearchCache::new());
        let orchestrator = Orchestrator::with_cache(
            SourceRegistry::new().with(slow.clone()),
            SearchOptions::default(),
            cache.clone(),
        );

        let abandoned = tokio::time::timeout(Duration::from_millis(10), orchestrator.search("graphene", 10)).await;
        assert!(abandoned.is_err());
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(cache.len(), 1);
        match orchestrator.search("graphene", 10).await {
            SearchOutcome::Success(success) => assert!(success.cached),
            other => panic!("expected cached success, got {:?}", other),
        }
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test]
    async fn test_health_check_reports_every_source() {
        use crate::sources::SourceHealth;

        let orchestrator = Orchestrator::new(
            SourceRegistry::new()
                .with(Arc::new(MockSource::new("openalex")))
                .with(Arc::new(
                    MockSource::new("pygetpapers").health_status(SourceHealth::Unavailable),
                )),
            SearchOptions::default(),
        );

        let health = orchestrator.health_check().await;
        assert_eq!(health.get("openalex").map(String::as_str), Some("available"));
        assert_eq!(health.get("pygetpapers").map(String::as_str), Some("unavailable"));
    }
}
