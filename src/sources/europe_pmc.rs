//! Europe PMC research source implementation using their REST API.
//!
//! Europe PMC indexes PubMed, PMC, and preprints from bioRxiv/medRxiv. Its
//! record shape is also what the `pygetpapers` harvester writes to disk, so
//! the record type here is shared with that adapter.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::models::{FetchRequest, Paper, PaperBuilder, SourceType};
use crate::sources::{Source, SourceError, SourceSettings};
use crate::utils::{normalize_values, with_retry, HttpClient, RawRecord, RetryConfig};

/// Europe PMC REST API search URL
const EUROPE_PMC_SEARCH_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";
const MAX_PAGE_SIZE: usize = 100;

/// Europe PMC research source
#[derive(Debug, Clone)]
pub struct EuropePmcSource {
    client: HttpClient,
    search_url: String,
    retry: RetryConfig,
}

impl EuropePmcSource {
    /// Create a new Europe PMC source
    pub fn new(settings: &SourceSettings) -> Self {
        Self::with_search_url(settings, EUROPE_PMC_SEARCH_URL)
    }

    /// Create a source pointed at a different search endpoint
    pub fn with_search_url(settings: &SourceSettings, search_url: impl Into<String>) -> Self {
        Self {
            client: HttpClient::new().requests_per_second(settings.requests_per_second),
            search_url: search_url.into(),
            retry: settings.retry,
        }
    }

    fn build_search_url(&self, query: &str, page_size: usize) -> String {
        let params = [
            ("query", query.to_string()),
            ("resultType", "core".to_string()),
            ("format", "json".to_string()),
            ("pageSize", page_size.to_string()),
        ];

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.search_url, query_string)
    }
}

#[async_trait]
impl Source for EuropePmcSource {
    fn id(&self) -> &str {
        "europe_pmc"
    }

    fn name(&self) -> &str {
        "Europe PMC"
    }

    fn max_results(&self) -> usize {
        MAX_PAGE_SIZE
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Paper>, SourceError> {
        request.validate()?;

        let url = self.build_search_url(request.query.trim(), request.capped_limit(self.max_results()));
        let body = with_retry(self.retry, self.id(), || self.client.get_text(&url, request)).await?;

        let data: SearchResult = serde_json::from_str(&body)?;
        Ok(normalize_values::<EpmcRecord>(data.result_list.result, self.id()))
    }
}

// ===== Europe PMC API Types =====

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "resultList")]
    result_list: ResultList,
}

#[derive(Debug, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<Value>,
}

/// One Europe PMC record, as served by the REST API or written by `pygetpapers`
#[derive(Debug, Deserialize)]
pub(crate) struct EpmcRecord {
    id: Option<String>,
    pmid: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    #[serde(rename = "authorList")]
    author_list: Option<AuthorList>,
    #[serde(rename = "authorString")]
    author_string: Option<String>,
    #[serde(default)]
    authors: Vec<NamedAuthor>,
    #[serde(rename = "abstractText", alias = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "pubYear", default, deserialize_with = "string_or_number")]
    pub_year: Option<String>,
    #[serde(rename = "firstPublicationDate")]
    first_publication_date: Option<String>,
    #[serde(rename = "journalInfo")]
    journal_info: Option<JournalInfo>,
    #[serde(rename = "journalTitle")]
    journal_title: Option<String>,
    #[serde(rename = "citedByCount")]
    cited_by_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AuthorList {
    #[serde(default)]
    author: Vec<FullNameAuthor>,
}

#[derive(Debug, Deserialize)]
struct FullNameAuthor {
    #[serde(rename = "fullName")]
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JournalInfo {
    journal: Option<Journal>,
}

#[derive(Debug, Deserialize)]
struct Journal {
    title: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl EpmcRecord {
    fn author_names(&mut self) -> Vec<String> {
        let from_list: Vec<String> = self
            .author_list
            .take()
            .map(|list| list.author.into_iter().filter_map(|a| a.full_name).collect())
            .unwrap_or_default();
        if !from_list.is_empty() {
            return from_list;
        }

        let named: Vec<String> = std::mem::take(&mut self.authors)
            .into_iter()
            .filter_map(|a| a.name)
            .collect();
        if !named.is_empty() {
            return named;
        }

        self.author_string
            .as_deref()
            .unwrap_or_default()
            .trim_end_matches('.')
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect()
    }
}

impl RawRecord for EpmcRecord {
    fn into_paper(mut self, source: &str) -> Paper {
        let authors = self.author_names();
        let id = self.id.or(self.pmid).unwrap_or_default();
        let doi = self.doi.unwrap_or_default();
        let url = if doi.is_empty() {
            format!("https://europepmc.org/article/MED/{}", id)
        } else {
            format!("https://doi.org/{}", doi)
        };
        let journal = self
            .journal_info
            .and_then(|info| info.journal)
            .and_then(|journal| journal.title)
            .or(self.journal_title)
            .unwrap_or_default();

        PaperBuilder::new(id, self.title.unwrap_or_default(), url, SourceType::from_id(source))
            .authors(authors)
            .abstract_text(self.abstract_text.unwrap_or_default())
            .year(self.pub_year.unwrap_or_default())
            .published_date(self.first_publication_date.unwrap_or_default())
            .journal(journal)
            .citations(self.cited_by_count.unwrap_or(0))
            .doi(doi)
            .build()
    }
}
