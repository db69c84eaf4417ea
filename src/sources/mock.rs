//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::models::{FetchRequest, Paper, PaperBuilder, SourceType};
use crate::sources::{Source, SourceError, SourceHealth};

type Response = Result<Vec<Paper>, SourceError>;

/// A scripted source that returns predefined responses and counts its calls.
///
/// Queued responses are served first, in order; once the queue is empty the
/// default response is returned on every call.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    queued: Mutex<VecDeque<Response>>,
    default: Mutex<Response>,
    delay: Option<Duration>,
    health: SourceHealth,
    calls: AtomicUsize,
}

impl MockSource {
    /// Create a mock that succeeds with no papers
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            queued: Mutex::new(VecDeque::new()),
            default: Mutex::new(Ok(Vec::new())),
            delay: None,
            health: SourceHealth::Available,
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock that always returns these papers
    pub fn with_papers(id: impl Into<String>, papers: Vec<Paper>) -> Self {
        Self::new(id).respond(Ok(papers))
    }

    /// Create a mock that always fails with this error
    pub fn failing(id: impl Into<String>, error: SourceError) -> Self {
        Self::new(id).respond(Err(error))
    }

    /// Set the response returned once the queue is empty
    pub fn respond(self, response: Response) -> Self {
        *self.default.lock().unwrap_or_else(PoisonError::into_inner) = response;
        self
    }

    /// Queue a one-shot response
    pub fn then(self, response: Response) -> Self {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
        self
    }

    /// Sleep before answering
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Availability reported by `health`
    pub fn health_status(mut self, health: SourceHealth) -> Self {
        self.health = health;
        self
    }

    /// Number of `fetch` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Response {
        let queued = self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        queued.unwrap_or_else(|| self.default.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Paper>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        request.validate()?;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let source = SourceType::from_id(&self.id);
        self.next_response().map(|papers| {
            papers
                .into_iter()
                .map(|mut paper| {
                    paper.source = source.clone();
                    paper
                })
                .collect()
        })
    }

    async fn health(&self) -> SourceHealth {
        self.health
    }
}

/// Helper function to create a mock paper for testing.
pub fn make_paper(paper_id: &str, title: &str, first_author: &str, date: &str) -> Paper {
    let year = date.get(..4).unwrap_or(date);
    PaperBuilder::new(
        paper_id,
        title,
        format!("http://example.com/{}", paper_id),
        SourceType::Other("mock".to_string()),
    )
    .authors([first_author])
    .abstract_text(format!("Abstract of {}", title))
    .year(year)
    .published_date(if date.len() > 4 { date } else { "" })
    .build()
}
