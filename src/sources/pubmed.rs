//! PubMed research source implementation using E-utilities API.
//!
//! A search is two calls: ESearch for the matching PMIDs, then ESummary for
//! their document summaries. Both are requested as JSON.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::{FetchRequest, Paper, PaperBuilder, SourceType};
use crate::sources::{Source, SourceError, SourceSettings};
use crate::utils::{normalize_values, with_retry, year_of, HttpClient, RawRecord, RetryConfig};

/// PubMed E-utilities API base URL
const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const MAX_RESULTS: usize = 50;

/// PubMed research source
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: HttpClient,
    base_url: String,
    retry: RetryConfig,
}

impl PubMedSource {
    /// Create a new PubMed source
    pub fn new(settings: &SourceSettings) -> Self {
        Self::with_base_url(settings, EUTILS_BASE)
    }

    /// Create a source pointed at a different E-utilities root
    pub fn with_base_url(settings: &SourceSettings, base_url: impl Into<String>) -> Self {
        Self {
            client: HttpClient::new().requests_per_second(settings.requests_per_second),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: settings.retry,
        }
    }

    fn build_url(&self, endpoint: &str, params: &[(&str, String)]) -> String {
        let query_string = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/{}?{}", self.base_url, endpoint, query_string)
    }

    async fn search_ids(&self, request: &FetchRequest, limit: usize) -> Result<Vec<String>, SourceError> {
        let url = self.build_url(
            "esearch.fcgi",
            &[
                ("db", "pubmed".to_string()),
                ("term", request.query.trim().to_string()),
                ("retmode", "json".to_string()),
                ("retmax", limit.to_string()),
            ],
        );
        let body = with_retry(self.retry, self.id(), || self.client.get_text(&url, request)).await?;

        let data: ESearchResponse = serde_json::from_str(&body)?;
        Ok(data.esearchresult.idlist)
    }

    async fn summaries(&self, request: &FetchRequest, ids: &[String]) -> Result<Vec<Value>, SourceError> {
        let url = self.build_url(
            "esummary.fcgi",
            &[
                ("db", "pubmed".to_string()),
                ("id", ids.join(",")),
                ("retmode", "json".to_string()),
            ],
        );
        let body = with_retry(self.retry, self.id(), || self.client.get_text(&url, request)).await?;

        let data: ESummaryResponse = serde_json::from_str(&body)?;
        Ok(data.result.into_ordered())
    }
}

#[async_trait]
impl Source for PubMedSource {
    fn id(&self) -> &str {
        "pubmed"
    }

    fn name(&self) -> &str {
        "PubMed"
    }

    fn max_results(&self) -> usize {
        MAX_RESULTS
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Paper>, SourceError> {
        request.validate()?;
        let limit = request.capped_limit(self.max_results());

        let ids = self.search_ids(request, limit).await?;
        if ids.is_empty() {
            tracing::debug!(source = self.id(), "ESearch returned no ids");
            return Ok(Vec::new());
        }

        let records = self.summaries(request, &ids).await?;
        Ok(normalize_values::<DocSummary>(records, self.id()))
    }
}

// ===== E-utilities API Types =====

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ESummaryResponse {
    result: ESummaryResult,
}

/// ESummary keys each summary by its PMID next to a `uids` list
#[derive(Debug, Deserialize)]
struct ESummaryResult {
    #[serde(default)]
    uids: Vec<String>,
    #[serde(flatten)]
    summaries: Map<String, Value>,
}

impl ESummaryResult {
    /// Summaries in `uids` order
    fn into_ordered(mut self) -> Vec<Value> {
        self.uids
            .iter()
            .filter_map(|uid| self.summaries.remove(uid))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct DocSummary {
    uid: String,
    title: Option<String>,
    #[serde(default)]
    authors: Vec<SummaryAuthor>,
    pubdate: Option<String>,
    sortpubdate: Option<String>,
    fulljournalname: Option<String>,
    source: Option<String>,
    elocationid: Option<String>,
    #[serde(default)]
    articleids: Vec<ArticleId>,
}

#[derive(Debug, Deserialize)]
struct SummaryAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    idtype: Option<String>,
    value: Option<String>,
}

impl DocSummary {
    /// DOI from the article id list, else from an `elocationid` such as `doi: 10.1/x`
    fn doi(&self) -> Option<String> {
        let listed = self
            .articleids
            .iter()
            .find(|id| id.idtype.as_deref() == Some("doi"))
            .and_then(|id| id.value.clone());
        let located = || {
            self.elocationid
                .as_deref()
                .map(|loc| loc.trim().trim_start_matches("doi:").trim())
                .filter(|loc| loc.starts_with("10."))
                .map(str::to_string)
        };
        listed.or_else(located).filter(|doi| !doi.is_empty())
    }

    /// ISO date from `sortpubdate` (`2021/03/05 00:00`)
    fn iso_date(&self) -> String {
        self.sortpubdate
            .as_deref()
            .and_then(|d| d.get(..10))
            .filter(|d| d.chars().all(|c| c.is_ascii_digit() || c == '/'))
            .map(|d| d.replace('/', "-"))
            .unwrap_or_default()
    }
}

impl RawRecord for DocSummary {
    fn into_paper(self, _source: &str) -> Paper {
        let doi = self.doi();
        let published_date = self.iso_date();
        let year = self.pubdate.as_deref().map(year_of).unwrap_or_default();
        let url = match &doi {
            Some(doi) => format!("https://doi.org/{}", doi),
            None => format!("https://pubmed.ncbi.nlm.nih.gov/{}/", self.uid),
        };
        let journal = self.fulljournalname.or(self.source).unwrap_or_default();
        let authors = self
            .authors
            .into_iter()
            .filter_map(|a| a.name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        PaperBuilder::new(self.uid, self.title.unwrap_or_default(), url, SourceType::PubMed)
            .authors(authors)
            .year(year)
            .published_date(published_date)
            .journal(journal)
            .doi(doi.unwrap_or_default())
            .build()
    }
}
