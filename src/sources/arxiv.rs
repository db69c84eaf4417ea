//! arXiv research source implementation.

use async_trait::async_trait;
use feed_rs::model::Entry;
use feed_rs::parser;

use crate::models::{FetchRequest, Paper, PaperBuilder, SourceType};
use crate::sources::{Source, SourceError, SourceSettings};
use crate::utils::{normalize, with_retry, year_of, HttpClient, RawRecord, RetryConfig};

/// Mirrored arXiv API endpoints, tried in order
const ARXIV_ENDPOINTS: [&str; 2] = [
    "https://export.arxiv.org/api/query",
    "http://export.arxiv.org/api/query",
];
const MAX_RESULTS: usize = 100;

/// arXiv research source
///
/// Reads the Atom feed of the arXiv query API. Each mirrored endpoint gets the
/// full retry budget before the next one is tried; when every endpoint fails
/// the last endpoint's error is returned.
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: HttpClient,
    endpoints: Vec<String>,
    retry: RetryConfig,
}

impl ArxivSource {
    /// Create a new arXiv source
    pub fn new(settings: &SourceSettings) -> Self {
        Self::with_endpoints(settings, ARXIV_ENDPOINTS.iter().map(|e| e.to_string()).collect())
    }

    /// Create a source with custom endpoints (for testing)
    pub fn with_endpoints(settings: &SourceSettings, endpoints: Vec<String>) -> Self {
        Self {
            client: HttpClient::new().requests_per_second(settings.requests_per_second),
            endpoints,
            retry: settings.retry,
        }
    }

    fn query_url(endpoint: &str, query: &str, max_results: usize) -> String {
        format!(
            "{}?search_query={}&start=0&max_results={}",
            endpoint,
            urlencoding::encode(&format!("all:{}", query)),
            max_results
        )
    }

    async fn fetch_from(
        &self,
        endpoint: &str,
        request: &FetchRequest,
        max_results: usize,
    ) -> Result<Vec<Paper>, SourceError> {
        let url = Self::query_url(endpoint, request.query.trim(), max_results);
        let body = with_retry(self.retry, self.id(), || self.client.get_text(&url, request)).await?;

        let feed = parser::parse(body.as_bytes())
            .map_err(|e| SourceError::Parse(format!("Failed to parse Atom feed: {}", e)))?;

        Ok(feed
            .entries
            .into_iter()
            .filter_map(|entry| normalize(entry, "arxiv"))
            .collect())
    }
}

/// Collapse the line breaks arXiv puts into titles and summaries
fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl RawRecord for Entry {
    fn into_paper(self, _source: &str) -> Paper {
        let title = self.title.map(|t| clean_text(&t.content)).unwrap_or_default();
        let abstract_text = self.summary.map(|s| clean_text(&s.content)).unwrap_or_default();
        let published = self
            .published
            .map(|d| d.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_default();
        let authors = self
            .authors
            .into_iter()
            .map(|a| a.name.trim().to_string())
            .filter(|name| !name.is_empty());

        PaperBuilder::new(self.id.clone(), title, self.id, SourceType::Arxiv)
            .authors(authors)
            .abstract_text(abstract_text)
            .year(year_of(&published))
            .published_date(published)
            .journal("arXiv")
            .citations(0)
            .build()
    }
}

#[async_trait]
impl Source for ArxivSource {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    fn max_results(&self) -> usize {
        MAX_RESULTS
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Paper>, SourceError> {
        request.validate()?;
        let max_results = request.capped_limit(self.max_results());

        let mut last_error = SourceError::Unavailable("No arXiv endpoint configured".to_string());
        for endpoint in &self.endpoints {
            match self.fetch_from(endpoint, request, max_results).await {
                Ok(papers) => return Ok(papers),
                Err(error) => {
                    tracing::warn!(source = self.id(), endpoint = %endpoint, %error, "arXiv endpoint failed");
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }
}
