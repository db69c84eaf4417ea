//! Provider execution strategies.
//!
//! Both executors return one [`ProviderResult`] per provider they invoked, in
//! provider-priority order. Completion order never leaks into the output.

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};

use crate::models::{FetchRequest, Paper, ProviderResult};
use crate::sources::{Source, SourceError};

/// How providers are invoked for one search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Invoke every provider concurrently and merge what finishes before the deadline
    #[default]
    FanOut,
    /// Try providers one at a time until one returns papers
    Fallback,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::FanOut => "fanout",
            Strategy::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fanout" | "fan-out" | "parallel" => Ok(Strategy::FanOut),
            "fallback" | "sequential" => Ok(Strategy::Fallback),
            other => Err(format!("unknown strategy '{}' (expected fanout or fallback)", other)),
        }
    }
}

/// Run one provider, turning a panic inside the adapter into an error
async fn guarded_fetch(source: &dyn Source, request: &FetchRequest) -> Result<Vec<Paper>, SourceError> {
    AssertUnwindSafe(source.fetch(request))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(SourceError::Unavailable("adapter panicked".to_string())))
}

fn log_outcome(source: &str, outcome: &Result<Vec<Paper>, SourceError>, elapsed: Duration) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match outcome {
        Ok(papers) => tracing::info!(source, count = papers.len(), elapsed_ms, "Provider succeeded"),
        Err(error) => tracing::warn!(source, %error, elapsed_ms, "Provider failed"),
    }
}

/// Invoke all providers concurrently, one task each, bounded by `deadline`.
///
/// Providers still running at the deadline are aborted and reported as
/// [`SourceError::Deadline`].
pub async fn fan_out(
    sources: &[Arc<dyn Source>],
    request: &FetchRequest,
    deadline: Duration,
) -> Vec<ProviderResult> {
    let deadline_at = Instant::now() + deadline;
    let mut tasks = JoinSet::new();

    for (index, source) in sources.iter().enumerate() {
        let source = Arc::clone(source);
        let request = request.clone();
        tasks.spawn(async move {
            let started = Instant::now();
            let outcome = guarded_fetch(source.as_ref(), &request).await;
            log_outcome(source.id(), &outcome, started.elapsed());
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<Result<Vec<Paper>, SourceError>>> = sources.iter().map(|_| None).collect();

    loop {
        match timeout_at(deadline_at, tasks.join_next()).await {
            Ok(Some(Ok((index, outcome)))) => slots[index] = Some(outcome),
            Ok(Some(Err(join_error))) => {
                tracing::warn!(error = %join_error, "Provider task ended abnormally");
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(
                    pending = tasks.len(),
                    deadline_ms = deadline.as_millis() as u64,
                    "Search deadline reached, abandoning slow providers"
                );
                tasks.abort_all();
                break;
            }
        }
    }

    sources
        .iter()
        .zip(slots)
        .map(|(source, slot)| {
            ProviderResult::new(source.id(), slot.unwrap_or(Err(SourceError::Deadline)))
        })
        .collect()
}

/// Try providers in priority order until one returns at least one paper.
///
/// Errors and empty results fall through to the next provider. `deadline`
/// bounds each provider call on its own; a provider that overruns it is
/// recorded as [`SourceError::Deadline`] and the chain moves on.
pub async fn fallback_chain(
    sources: &[Arc<dyn Source>],
    request: &FetchRequest,
    deadline: Duration,
) -> Vec<ProviderResult> {
    let mut results = Vec::with_capacity(sources.len());

    for source in sources {
        let started = Instant::now();
        let outcome = timeout(deadline, guarded_fetch(source.as_ref(), request))
            .await
            .unwrap_or(Err(SourceError::Deadline));
        log_outcome(source.id(), &outcome, started.elapsed());

        let result = ProviderResult::new(source.id(), outcome);
        let done = result.has_papers();
        results.push(result);

        if done {
            break;
        }
    }

    results
}

/// Run the given strategy
pub async fn execute(
    strategy: Strategy,
    sources: &[Arc<dyn Source>],
    request: &FetchRequest,
    deadline: Duration,
) -> Vec<ProviderResult> {
    match strategy {
        Strategy::FanOut => fan_out(sources, request, deadline).await,
        Strategy::Fallback => fallback_chain(sources, request, deadline).await,
    }
}
