//! CrossRef research source implementation.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

use crate::models::{FetchRequest, Paper, PaperBuilder, SourceType};
use crate::sources::{Source, SourceError, SourceSettings};
use crate::utils::{normalize_values, with_retry, HttpClient, RawRecord, RetryConfig};

const CROSSREF_API_BASE: &str = "https://api.crossref.org";
const MAX_ROWS: usize = 20;

/// CrossRef research source
///
/// Uses the CrossRef REST works search.
#[derive(Debug, Clone)]
pub struct CrossRefSource {
    client: HttpClient,
    base_url: String,
    retry: RetryConfig,
}

impl CrossRefSource {
    pub fn new(settings: &SourceSettings) -> Self {
        Self::with_base_url(settings, CROSSREF_API_BASE)
    }

    /// Create a source pointed at a different API root
    pub fn with_base_url(settings: &SourceSettings, base_url: impl Into<String>) -> Self {
        // CrossRef routes requests that carry a contact address to its polite pool
        let user_agent = match &settings.openalex_email {
            Some(email) if !email.trim().is_empty() => {
                format!("{} (mailto:{})", crate::utils::USER_AGENT, email)
            }
            _ => crate::utils::USER_AGENT.to_string(),
        };

        Self {
            client: HttpClient::with_user_agent(user_agent)
                .requests_per_second(settings.requests_per_second),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: settings.retry,
        }
    }
}

#[async_trait]
impl Source for CrossRefSource {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "CrossRef"
    }

    fn max_results(&self) -> usize {
        MAX_ROWS
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Paper>, SourceError> {
        request.validate()?;

        let url = format!(
            "{}/works?query={}&rows={}",
            self.base_url,
            urlencoding::encode(request.query.trim()),
            request.capped_limit(self.max_results())
        );
        let body = with_retry(self.retry, self.id(), || self.client.get_text(&url, request)).await?;

        let data: CRResponse = serde_json::from_str(&body)?;
        Ok(normalize_values::<CRItem>(data.message.items, self.id()))
    }
}

/// Strip JATS/XML markup from a CrossRef abstract
fn strip_markup(text: &str) -> String {
    static TAGS: OnceLock<Option<Regex>> = OnceLock::new();
    let stripped = match TAGS.get_or_init(|| Regex::new(r"<[^>]+>").ok()) {
        Some(re) => re.replace_all(text, " ").into_owned(),
        None => text.to_string(),
    };
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ===== CrossRef API Types =====

#[derive(Debug, Deserialize)]
struct CRResponse {
    message: CRMessage,
}

#[derive(Debug, Deserialize)]
struct CRMessage {
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CRItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<CRAuthor>,
    r#abstract: Option<String>,
    published: Option<CRDate>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(rename = "is-referenced-by-count")]
    is_referenced_by_count: Option<u32>,
    #[serde(rename = "URL")]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CRAuthor {
    fn full_name(self) -> String {
        let joined = format!(
            "{} {}",
            self.given.unwrap_or_default(),
            self.family.unwrap_or_default()
        );
        let joined = joined.trim();
        if joined.is_empty() {
            self.name.unwrap_or_default().trim().to_string()
        } else {
            joined.to_string()
        }
    }
}

impl CRDate {
    /// (year, ISO date) from the first date-parts entry; the date is empty
    /// when only the year is known
    fn split(&self) -> (String, String) {
        let parts = self.date_parts.first().map(Vec::as_slice).unwrap_or_default();
        match parts {
            [Some(y), Some(m), Some(d), ..] => (y.to_string(), format!("{:04}-{:02}-{:02}", y, m, d)),
            [Some(y), Some(m), ..] => (y.to_string(), format!("{:04}-{:02}", y, m)),
            [Some(y), ..] => (y.to_string(), String::new()),
            _ => (String::new(), String::new()),
        }
    }
}

impl RawRecord for CRItem {
    fn into_paper(self, _source: &str) -> Paper {
        let doi = self.doi.unwrap_or_default();
        let url = if doi.is_empty() {
            self.url.unwrap_or_default()
        } else {
            format!("https://doi.org/{}", doi)
        };
        let (year, published_date) = self.published.map(|d| d.split()).unwrap_or_default();
        let authors = self
            .author
            .into_iter()
            .map(CRAuthor::full_name)
            .filter(|name| !name.is_empty());

        PaperBuilder::new(
            doi.clone(),
            self.title.into_iter().next().unwrap_or_default(),
            url,
            SourceType::CrossRef,
        )
        .authors(authors)
        .abstract_text(self.r#abstract.as_deref().map(strip_markup).unwrap_or_default())
        .year(year)
        .published_date(published_date)
        .journal(self.container_title.into_iter().next().unwrap_or_default())
        .citations(self.is_referenced_by_count.unwrap_or(0))
        .doi(doi)
        .build()
    }
}
