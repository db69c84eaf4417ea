//! OpenAlex research source implementation.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::models::{FetchRequest, Paper, PaperBuilder, SourceType};
use crate::sources::{Source, SourceError, SourceSettings};
use crate::utils::{normalize_values, reconstruct_abstract, with_retry, HttpClient, RawRecord, RetryConfig};

const OPENALEX_API_BASE: &str = "https://api.openalex.org";
const MAX_PER_PAGE: usize = 50;

/// OpenAlex research source
///
/// Uses the OpenAlex works search endpoint. Abstracts arrive as inverted
/// indexes and are rebuilt during normalization.
#[derive(Debug, Clone)]
pub struct OpenAlexSource {
    client: HttpClient,
    base_url: String,
    email: Option<String>,
    retry: RetryConfig,
}

impl OpenAlexSource {
    /// Create a new OpenAlex source
    pub fn new(settings: &SourceSettings) -> Self {
        Self::with_base_url(settings, OPENALEX_API_BASE)
    }

    /// Create a source pointed at a different API root
    pub fn with_base_url(settings: &SourceSettings, base_url: impl Into<String>) -> Self {
        let email = settings
            .openalex_email
            .clone()
            .filter(|e| !e.trim().is_empty());
        let user_agent = match &email {
            Some(email) => format!("{} (mailto:{})", crate::utils::USER_AGENT, email),
            None => crate::utils::USER_AGENT.to_string(),
        };

        Self {
            client: HttpClient::with_user_agent(user_agent)
                .requests_per_second(settings.requests_per_second),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            email,
            retry: settings.retry,
        }
    }

    fn search_url(&self, query: &str, per_page: usize) -> String {
        let mut url = format!(
            "{}/works?search={}&per-page={}",
            self.base_url,
            urlencoding::encode(query),
            per_page
        );
        if let Some(email) = &self.email {
            url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
        }
        url
    }
}

/// Replace punctuation the search endpoint rejects and collapse whitespace
pub(crate) fn sanitize_query(query: &str) -> String {
    static DISALLOWED: OnceLock<Option<Regex>> = OnceLock::new();
    let stripped = match DISALLOWED.get_or_init(|| Regex::new(r"[^\w\s-]").ok()) {
        Some(re) => re.replace_all(query, " ").into_owned(),
        None => query.to_string(),
    };
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Source for OpenAlexSource {
    fn id(&self) -> &str {
        "openalex"
    }

    fn name(&self) -> &str {
        "OpenAlex"
    }

    fn max_results(&self) -> usize {
        MAX_PER_PAGE
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Paper>, SourceError> {
        request.validate()?;

        let query = sanitize_query(&request.query);
        if query.is_empty() {
            tracing::debug!(source = self.id(), "Query is empty after sanitizing");
            return Ok(Vec::new());
        }

        let url = self.search_url(&query, request.capped_limit(self.max_results()));
        let body = with_retry(self.retry, self.id(), || self.client.get_text(&url, request)).await?;

        let data: WorksResponse = serde_json::from_str(&body)?;
        Ok(normalize_values::<Work>(data.results, self.id()))
    }
}

// ===== OpenAlex API Types =====

#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Work {
    id: Option<String>,
    title: Option<String>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    publication_year: Option<i32>,
    publication_date: Option<String>,
    primary_location: Option<Location>,
    doi: Option<String>,
    cited_by_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: Option<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    source: Option<LocationSource>,
}

#[derive(Debug, Deserialize)]
struct LocationSource {
    display_name: Option<String>,
}

impl RawRecord for Work {
    fn into_paper(self, _source: &str) -> Paper {
        let authors = self
            .authorships
            .into_iter()
            .filter_map(|a| a.author.and_then(|author| author.display_name))
            .filter(|name| !name.trim().is_empty());

        let abstract_text = reconstruct_abstract(&self.abstract_inverted_index.unwrap_or_default());

        let journal = self
            .primary_location
            .and_then(|loc| loc.source)
            .and_then(|src| src.display_name)
            .unwrap_or_default();

        let doi = self.doi.unwrap_or_default();
        let id = self.id.unwrap_or_default();
        let url = if doi.is_empty() { id.clone() } else { doi.clone() };

        PaperBuilder::new(id, self.title.unwrap_or_default(), url, SourceType::OpenAlex)
            .authors(authors)
            .abstract_text(abstract_text)
            .year(self.publication_year.map(|y| y.to_string()).unwrap_or_default())
            .published_date(self.publication_date.unwrap_or_default())
            .journal(journal)
            .citations(self.cited_by_count.unwrap_or(0))
            .doi(doi)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::NO_ABSTRACT;
    use mockito::Matcher;
    use std::time::Duration;

    fn test_settings() -> SourceSettings {
        SourceSettings {
            retry: RetryConfig {
                initial_delay: Duration::from_millis(5),
                ..RetryConfig::default()
            },
            requests_per_second: 0,
            openalex_email: None,
            ..SourceSettings::default()
        }
    }

    const WORKS_BODY: &str = r#"{
        "meta": {"count": 2},
        "results": [
            {
                "id": "https://openalex.org/W1",
                "title": "Electric Field Effect in Atomically Thin Carbon Films",
                "authorships": [
                    {"author": {"display_name": "K. S. Novoselov"}},
                    {"author": {"display_name": "A. K. Geim"}}
                ],
                "abstract_inverted_index": {"We": [0], "describe": [1], "graphene": [2]},
                "publication_year": 2004,
                "publication_date": "2004-10-22",
                "primary_location": {"source": {"display_name": "Science"}},
                "doi": "https://doi.org/10.1126/science.1102896",
                "cited_by_count": 50000
            },
            {
                "id": "https://openalex.org/W2",
                "title": "Untitled work without abstract",
                "authorships": [],
                "abstract_inverted_index": null,
                "publication_year": null,
                "primary_location": null,
                "doi": null
            },
            {
                "id": "https://openalex.org/W3",
                "title": ["not", "a", "string"]
            }
        ]
    }"#;

    #[test]
    fn test_sanitize_query() {
        assert_eq!(sanitize_query("graphene: \"2D\" materials!"), "graphene 2D materials");
        assert_eq!(sanitize_query("self-assembly   of  MOFs"), "self-assembly of MOFs");
        assert_eq!(sanitize_query("?!*"), "");
    }

    #[tokio::test]
    async fn test_fetch_maps_works() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search".into(), "graphene".into()),
                Matcher::UrlEncoded("per-page".into(), "10".into()),
            ]))
            .with_status(200)
            .with_body(WORKS_BODY)
            .create_async()
            .await;

        let source = OpenAlexSource::with_base_url(&test_settings(), server.url());
        let papers = source.fetch(&FetchRequest::new("graphene", 10)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.title, "Electric Field Effect in Atomically Thin Carbon Films");
        assert_eq!(first.authors, vec!["K. S. Novoselov", "A. K. Geim"]);
        assert_eq!(first.r#abstract, "We describe graphene");
        assert_eq!(first.year, "2004");
        assert_eq!(first.published_date, "2004-10-22");
        assert_eq!(first.journal, "Science");
        assert_eq!(first.citations, 50000);
        assert_eq!(first.url, "https://doi.org/10.1126/science.1102896");
        assert_eq!(first.source, SourceType::OpenAlex);

        let second = &papers[1];
        assert_eq!(second.r#abstract, NO_ABSTRACT);
        assert_eq!(second.url, "https://openalex.org/W2");
        assert_eq!(second.citations, 0);
    }

    #[tokio::test]
    async fn test_limit_is_capped() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::UrlEncoded("per-page".into(), "50".into()))
            .with_status(200)
            .with_body(r#"{"results": []}"#)
            .create_async()
            .await;

        let source = OpenAlexSource::with_base_url(&test_settings(), server.url());
        let papers = source.fetch(&FetchRequest::new("graphene", 500)).await.unwrap();

        mock.assert_async().await;
        assert!(papers.is_empty());
    }

    #[tokio::test]
    async fn test_mailto_is_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::UrlEncoded("mailto".into(), "me@example.org".into()))
            .with_status(200)
            .with_body(r#"{"results": []}"#)
            .create_async()
            .await;

        let settings = SourceSettings {
            openalex_email: Some("me@example.org".into()),
            ..test_settings()
        };
        let source = OpenAlexSource::with_base_url(&settings, server.url());
        source.fetch(&FetchRequest::new("graphene", 5)).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let source = OpenAlexSource::with_base_url(&test_settings(), server.url());
        let result = source.fetch(&FetchRequest::new("graphene", 5)).await;

        failing.assert_async().await;
        assert_eq!(result, Err(SourceError::Server(503)));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .with_status(400)
            .expect(1)
            .create_async()
            .await;

        let source = OpenAlexSource::with_base_url(&test_settings(), server.url());
        let result = source.fetch(&FetchRequest::new("graphene", 5)).await;

        mock.assert_async().await;
        assert_eq!(result, Err(SourceError::Client(400)));
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let source = OpenAlexSource::with_base_url(&test_settings(), server.url());
        let result = source.fetch(&FetchRequest::new("graphene", 5)).await;

        assert!(matches!(result, Err(SourceError::Parse(_))));
    }

    #[tokio::test]
    async fn test_punctuation_only_query_is_empty_success() {
        let source = OpenAlexSource::with_base_url(&test_settings(), "http://127.0.0.1:9");
        let papers = source.fetch(&FetchRequest::new("?!?", 5)).await.unwrap();
        assert!(papers.is_empty());
    }
}
