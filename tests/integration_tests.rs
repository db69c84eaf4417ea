//! Integration tests for Research Aggregator
//!
//! These tests drive the orchestrator end to end with scripted mock sources,
//! so no network access is needed.

use research_aggregator::models::{FailureKind, Paper, SearchOutcome, SourceType};
use research_aggregator::sources::mock::make_paper;
use research_aggregator::sources::{MockSource, OpenAlexSource, SourceError, SourceRegistry, SourceSettings};
use research_aggregator::utils::{ManualClock, RetryConfig, SearchCache};
use research_aggregator::{Orchestrator, SearchOptions, Strategy};
use std::sync::Arc;
use std::time::Duration;

fn options(strategy: Strategy) -> SearchOptions {
    SearchOptions {
        strategy,
        ..SearchOptions::default()
    }
}

fn graphene_sources() -> (Arc<MockSource>, Arc<MockSource>) {
    let first = MockSource::with_papers(
        "openalex",
        vec![
            make_paper("oa1", "Graphene transistors", "Geim", "2019-05-01"),
            make_paper("oa2", "Graphene oxide membranes", "Nair", "2021-02-10"),
            make_paper("oa3", "Twisted bilayer graphene", "Cao", "2018-03-05"),
            make_paper("oa4", "Graphene plasmonics", "Koppens", "2020"),
            make_paper("oa5", "Graphene batteries", "Zhang", "2023-07-20"),
        ],
    );
    let second = MockSource::with_papers(
        "arxiv",
        vec![
            // Same title and first author as openalex entries, different casing
            make_paper("ax1", "GRAPHENE TRANSISTORS", "geim", "2019-05-02"),
            make_paper("ax2", "Twisted Bilayer Graphene", "Cao", "2018-03-01"),
            make_paper("ax3", "Graphene spintronics", "Han", "2022-11-11"),
        ],
    );
    (Arc::new(first), Arc::new(second))
}

fn registry(sources: &[Arc<MockSource>]) -> SourceRegistry {
    sources
        .iter()
        .fold(SourceRegistry::new(), |registry, source| registry.with(source.clone()))
}

fn dates(papers: &[Paper]) -> Vec<&str> {
    papers.iter().map(|p| p.date_key()).collect()
}

#[tokio::test]
async fn test_fan_out_merges_and_ranks_graphene() {
    let (first, second) = graphene_sources();
    let orchestrator = Orchestrator::new(registry(&[first, second]), options(Strategy::FanOut));

    let outcome = orchestrator.search("graphene", 10).await;

    let papers = outcome.papers();
    assert_eq!(papers.len(), 6);
    assert_eq!(
        dates(papers),
        vec!["2023-07-20", "2022-11-11", "2021-02-10", "2020", "2019-05-01", "2018-03-05"]
    );
    // First occurrence in priority order wins
    assert_eq!(papers[4].id, "oa1");
    assert_eq!(papers[4].source, SourceType::OpenAlex);
    assert_eq!(outcome.sources_used(), ["openalex", "arxiv"]);
}

#[tokio::test]
async fn test_all_sources_failing_is_aggregate_failure() {
    let failing = [
        Arc::new(MockSource::failing("openalex", SourceError::Timeout("timed out".into()))),
        Arc::new(MockSource::failing("arxiv", SourceError::Server(503))),
        Arc::new(MockSource::failing("crossref", SourceError::Network("refused".into()))),
    ];
    let orchestrator = Orchestrator::new(registry(&failing), options(Strategy::FanOut));

    let outcome = orchestrator.search("quantum computing", 10).await;

    assert!(outcome.papers().is_empty());
    match outcome {
        SearchOutcome::Failure(failure) => {
            assert_eq!(failure.kind, FailureKind::AllSourcesFailed);
            assert!(!failure.suggestions.is_empty());
            let sources: Vec<_> = failure.source_errors.iter().map(|e| e.source.as_str()).collect();
            assert_eq!(sources, vec!["openalex", "arxiv", "crossref"]);
        }
        SearchOutcome::Success(success) => panic!("expected failure, got {:?}", success),
    }
}

#[tokio::test]
async fn test_exhausted_retries_end_in_aggregate_failure() {
    let mut server = mockito::Server::new_async().await;
    let unavailable = server
        .mock("GET", "/works")
        .match_query(mockito::Matcher::Any)
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let settings = SourceSettings {
        retry: RetryConfig {
            initial_delay: Duration::from_millis(5),
            ..RetryConfig::default()
        },
        requests_per_second: 0,
        ..SourceSettings::default()
    };
    let openalex = Arc::new(OpenAlexSource::with_base_url(&settings, server.url()));
    let cache = Arc::new(SearchCache::new());
    let orchestrator = Orchestrator::with_cache(
        SourceRegistry::new().with(openalex),
        options(Strategy::FanOut),
        cache.clone(),
    );

    let outcome = orchestrator.search("graphene", 10).await;

    unavailable.assert_async().await;
    assert!(cache.is_empty());
    match outcome {
        SearchOutcome::Failure(failure) => {
            assert_eq!(failure.kind, FailureKind::AllSourcesFailed);
            assert_eq!(failure.source_errors.len(), 1);
            assert_eq!(failure.source_errors[0].source, "openalex");
            assert_eq!(failure.source_errors[0].error, SourceError::Server(503).to_string());
        }
        SearchOutcome::Success(success) => panic!("expected failure, got {:?}", success),
    }
}

#[tokio::test]
async fn test_short_query_makes_no_provider_calls() {
    let (first, second) = graphene_sources();
    let cache = Arc::new(SearchCache::new());
    let orchestrator = Orchestrator::with_cache(
        registry(&[first.clone(), second.clone()]),
        options(Strategy::FanOut),
        cache.clone(),
    );

    let outcome = orchestrator.search("ai", 10).await;

    assert_eq!(outcome.failure_kind(), Some(FailureKind::Validation));
    if let SearchOutcome::Failure(failure) = outcome {
        assert_eq!(failure.message, "Query must be at least 3 characters long");
        assert!(!failure.suggestions.is_empty());
    }
    assert_eq!(first.calls(), 0);
    assert_eq!(second.calls(), 0);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_result_never_exceeds_limit() {
    let (first, second) = graphene_sources();
    let orchestrator = Orchestrator::new(registry(&[first, second]), options(Strategy::FanOut));

    for limit in [1, 3, 6, 50] {
        let outcome = orchestrator.search("graphene", limit).await;
        assert!(outcome.papers().len() <= limit, "limit {} exceeded", limit);
    }
}

#[tokio::test]
async fn test_cache_hit_skips_providers_until_ttl() {
    let (first, second) = graphene_sources();
    let clock = Arc::new(ManualClock::new());
    let cache = Arc::new(SearchCache::with_clock(Duration::from_secs(3600), clock.clone()));
    let orchestrator = Orchestrator::with_cache(
        registry(&[first.clone(), second.clone()]),
        options(Strategy::FanOut),
        cache,
    );

    let fresh = orchestrator.search("graphene", 10).await;
    let cached = orchestrator.search("  Graphene ", 10).await;

    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
    match (&fresh, &cached) {
        (SearchOutcome::Success(fresh), SearchOutcome::Success(cached)) => {
            assert!(!fresh.cached);
            assert!(cached.cached);
            assert_eq!(fresh.papers, cached.papers);
            assert_eq!(fresh.sources_used, cached.sources_used);
        }
        other => panic!("expected two successes, got {:?}", other),
    }

    clock.advance(Duration::from_secs(3601));
    let expired = orchestrator.search("graphene", 10).await;

    assert!(expired.is_success());
    assert_eq!(first.calls(), 2);
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let flaky = Arc::new(
        MockSource::with_papers("openalex", vec![make_paper("1", "Recovered", "A", "2020")])
            .then(Err(SourceError::Server(502))),
    );
    let cache = Arc::new(SearchCache::new());
    let orchestrator =
        Orchestrator::with_cache(registry(&[flaky.clone()]), options(Strategy::FanOut), cache.clone());

    let first = orchestrator.search("graphene", 10).await;
    assert_eq!(first.failure_kind(), Some(FailureKind::AllSourcesFailed));
    assert!(cache.is_empty());

    let second = orchestrator.search("graphene", 10).await;
    assert_eq!(second.papers().len(), 1);
    assert_eq!(flaky.calls(), 2);
}

#[tokio::test]
async fn test_partial_success_omits_failed_source() {
    let ok = Arc::new(MockSource::with_papers(
        "arxiv",
        vec![make_paper("1", "Working provider", "A", "2021")],
    ));
    let broken = Arc::new(MockSource::failing("openalex", SourceError::Client(400)));
    let orchestrator = Orchestrator::new(registry(&[broken, ok]), options(Strategy::FanOut));

    match orchestrator.search("graphene", 10).await {
        SearchOutcome::Success(success) => {
            assert_eq!(success.papers.len(), 1);
            assert_eq!(success.sources_used, vec!["arxiv"]);
            assert_eq!(success.failed_sources.len(), 1);
            assert_eq!(success.failed_sources[0].source, "openalex");
        }
        SearchOutcome::Failure(failure) => panic!("unexpected failure: {:?}", failure),
    }
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_deadline_drops_slow_provider() {
    let slow = Arc::new(
        MockSource::with_papers("openalex", vec![make_paper("slow", "Slow paper", "A", "2024")])
            .delay(Duration::from_secs(60)),
    );
    let fast = Arc::new(MockSource::with_papers(
        "arxiv",
        vec![make_paper("fast", "Fast paper", "B", "2020")],
    ));
    let orchestrator = Orchestrator::new(
        registry(&[slow, fast]),
        SearchOptions {
            deadline: Duration::from_secs(15),
            ..SearchOptions::default()
        },
    );

    let started = tokio::time::Instant::now();
    let outcome = orchestrator.search("graphene", 10).await;

    assert!(started.elapsed() <= Duration::from_secs(16));
    match outcome {
        SearchOutcome::Success(success) => {
            assert_eq!(success.papers.len(), 1);
            assert_eq!(success.papers[0].id, "fast");
            assert_eq!(success.sources_used, vec!["arxiv"]);
            assert_eq!(success.failed_sources[0].source, "openalex");
        }
        SearchOutcome::Failure(failure) => panic!("unexpected failure: {:?}", failure),
    }
}

#[tokio::test]
async fn test_fallback_uses_first_non_empty_provider() {
    let failing = Arc::new(MockSource::failing("openalex", SourceError::Server(500)));
    let empty = Arc::new(MockSource::new("arxiv"));
    let good = Arc::new(MockSource::with_papers(
        "crossref",
        vec![
            make_paper("c1", "Older", "A", "2010"),
            make_paper("c2", "Newer", "B", "2015"),
        ],
    ));
    let unused = Arc::new(MockSource::with_papers(
        "europe_pmc",
        vec![make_paper("e1", "Never seen", "C", "2024")],
    ));
    let orchestrator = Orchestrator::new(
        registry(&[failing.clone(), empty.clone(), good.clone(), unused.clone()]),
        options(Strategy::Fallback),
    );

    let outcome = orchestrator.search("graphene", 10).await;

    let ids: Vec<_> = outcome.papers().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["c2", "c1"]);
    assert_eq!(outcome.sources_used(), ["crossref"]);
    assert_eq!(
        (failing.calls(), empty.calls(), good.calls(), unused.calls()),
        (1, 1, 1, 0)
    );
}

#[tokio::test(start_paused = true)]
async fn test_fallback_reaches_healthy_provider_after_hung_one() {
    let hung = Arc::new(
        MockSource::failing("openalex", SourceError::Timeout("read timed out".into()))
            .delay(Duration::from_millis(18_900)),
    );
    let healthy = Arc::new(MockSource::with_papers(
        "arxiv",
        vec![make_paper("a1", "Still answered", "A", "2022")],
    ));
    let orchestrator = Orchestrator::new(
        registry(&[hung.clone(), healthy.clone()]),
        options(Strategy::Fallback),
    );

    match orchestrator.search("graphene", 10).await {
        SearchOutcome::Success(success) => {
            assert_eq!(success.papers.len(), 1);
            assert_eq!(success.sources_used, vec!["arxiv"]);
            assert_eq!(success.failed_sources[0].source, "openalex");
            assert_eq!(success.failed_sources[0].error, SourceError::Deadline.to_string());
        }
        SearchOutcome::Failure(failure) => panic!("unexpected failure: {:?}", failure),
    }
    assert_eq!(healthy.calls(), 1);
}

#[tokio::test]
async fn test_fallback_with_only_empty_results_is_empty_success() {
    let orchestrator = Orchestrator::new(
        registry(&[Arc::new(MockSource::new("openalex")), Arc::new(MockSource::new("arxiv"))]),
        options(Strategy::Fallback),
    );

    let outcome = orchestrator.search("an obscure query", 10).await;

    assert!(outcome.is_success());
    assert!(outcome.papers().is_empty());
}

#[tokio::test]
async fn test_concurrent_identical_searches_share_one_execution() {
    let slow = Arc::new(
        MockSource::with_papers("openalex", vec![make_paper("1", "Shared", "A", "2020")])
            .delay(Duration::from_millis(100)),
    );
    let orchestrator = Orchestrator::new(registry(&[slow.clone()]), options(Strategy::FanOut));

    let searches = (0..5).map(|_| {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.search("graphene", 10).await })
    });
    let outcomes = futures_util::future::join_all(searches).await;

    assert_eq!(slow.calls(), 1);
    for outcome in outcomes {
        assert_eq!(outcome.unwrap().papers().len(), 1);
    }

    // The in-flight entry is gone once the shared execution finished
    orchestrator.search("graphene", 10).await;
    assert_eq!(slow.calls(), 2);
}

#[tokio::test]
async fn test_health_check_never_searches() {
    let (first, second) = graphene_sources();
    let orchestrator = Orchestrator::new(registry(&[first.clone(), second.clone()]), SearchOptions::default());

    let health = orchestrator.health_check().await;

    assert_eq!(health.len(), 2);
    assert!(health.values().all(|status| status == "available"));
    assert_eq!(first.calls() + second.calls(), 0);
}

#[test]
fn test_default_config_builds_orchestrator() {
    let config = research_aggregator::config::Config::default();
    let orchestrator = Orchestrator::from_config(&config).unwrap();
    assert_eq!(
        orchestrator.registry().ids().collect::<Vec<_>>(),
        vec!["openalex", "arxiv", "crossref", "europe_pmc"]
    );
    assert_eq!(orchestrator.options().strategy, Strategy::FanOut);
}
