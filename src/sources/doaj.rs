//! DOAJ (Directory of Open Access Journals) research source implementation.
//!
//! Uses the DOAJ article search, which takes the query as a path segment.
//! DOAJ is free and requires no API key for basic search.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::models::{FetchRequest, Paper, PaperBuilder, SourceType};
use crate::sources::{Source, SourceError, SourceSettings};
use crate::utils::{normalize_values, with_retry, year_of, HttpClient, RawRecord, RetryConfig};

const DOAJ_API_BASE: &str = "https://doaj.org/api/v2/search/articles";
const MAX_PAGE_SIZE: usize = 50;

/// DOAJ research source
#[derive(Debug, Clone)]
pub struct DoajSource {
    client: HttpClient,
    base_url: String,
    retry: RetryConfig,
}

impl DoajSource {
    pub fn new(settings: &SourceSettings) -> Self {
        Self::with_base_url(settings, DOAJ_API_BASE)
    }

    /// Create a source pointed at a different article search root
    pub fn with_base_url(settings: &SourceSettings, base_url: impl Into<String>) -> Self {
        Self {
            client: HttpClient::new().requests_per_second(settings.requests_per_second),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: settings.retry,
        }
    }
}

#[async_trait]
impl Source for DoajSource {
    fn id(&self) -> &str {
        "doaj"
    }

    fn name(&self) -> &str {
        "DOAJ"
    }

    fn max_results(&self) -> usize {
        MAX_PAGE_SIZE
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Paper>, SourceError> {
        request.validate()?;

        let url = format!(
            "{}/{}?pageSize={}",
            self.base_url,
            urlencoding::encode(request.query.trim()),
            request.capped_limit(self.max_results())
        );
        let body = with_retry(self.retry, self.id(), || self.client.get_text(&url, request)).await?;

        let data: DoajResponse = serde_json::from_str(&body)?;
        Ok(normalize_values::<DoajArticle>(data.results, self.id()))
    }
}

// ===== DOAJ API Types =====

#[derive(Debug, Deserialize)]
struct DoajResponse {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct DoajArticle {
    id: Option<String>,
    #[serde(default)]
    bibjson: BibJson,
}

#[derive(Debug, Default, Deserialize)]
struct BibJson {
    title: Option<String>,
    #[serde(default)]
    author: Vec<DoajAuthor>,
    r#abstract: Option<String>,
    year: Option<String>,
    #[serde(default)]
    identifier: Vec<DoajIdentifier>,
    #[serde(default)]
    link: Vec<DoajLink>,
    journal: Option<DoajJournal>,
}

#[derive(Debug, Deserialize)]
struct DoajAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DoajIdentifier {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DoajLink {
    #[serde(rename = "type")]
    kind: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DoajJournal {
    title: Option<String>,
}

impl RawRecord for DoajArticle {
    fn into_paper(self, _source: &str) -> Paper {
        let bib = self.bibjson;
        let doi = bib
            .identifier
            .into_iter()
            .find(|i| i.kind.as_deref().is_some_and(|k| k.eq_ignore_ascii_case("doi")))
            .and_then(|i| i.id)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        let fulltext = bib
            .link
            .into_iter()
            .find(|l| l.kind.as_deref() == Some("fulltext"))
            .and_then(|l| l.url);
        let url = match (&doi, fulltext) {
            (_, Some(link)) => link,
            (Some(doi), None) => format!("https://doi.org/{}", doi),
            (None, None) => self
                .id
                .as_deref()
                .map(|id| format!("https://doaj.org/article/{}", id))
                .unwrap_or_default(),
        };
        let id = doi.clone().or(self.id).unwrap_or_else(|| url.clone());
        let year = bib.year.as_deref().map(year_of).unwrap_or_default();
        let authors = bib
            .author
            .into_iter()
            .filter_map(|a| a.name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        PaperBuilder::new(id, bib.title.unwrap_or_default(), url, SourceType::Doaj)
            .authors(authors)
            .abstract_text(bib.r#abstract.unwrap_or_default())
            .year(year)
            .journal(bib.journal.and_then(|j| j.title).unwrap_or_default())
            .doi(doi.unwrap_or_default())
            .build()
    }
}
