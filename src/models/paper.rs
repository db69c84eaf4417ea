//! Paper model representing a research paper from any provider.

use serde::{Deserialize, Serialize};

/// The provider a paper was retrieved from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    #[serde(rename = "openalex")]
    OpenAlex,
    #[serde(rename = "arxiv")]
    Arxiv,
    #[serde(rename = "crossref")]
    CrossRef,
    #[serde(rename = "europe_pmc")]
    EuropePMC,
    #[serde(rename = "pygetpapers")]
    Pygetpapers,
    #[serde(rename = "doaj")]
    Doaj,
    #[serde(rename = "pubmed")]
    PubMed,
    #[serde(untagged)]
    Other(String),
}

impl SourceType {
    /// Resolve a provider id to its source type
    pub fn from_id(id: &str) -> Self {
        match id {
            "openalex" => SourceType::OpenAlex,
            "arxiv" => SourceType::Arxiv,
            "crossref" => SourceType::CrossRef,
            "europe_pmc" => SourceType::EuropePMC,
            "pygetpapers" => SourceType::Pygetpapers,
            "doaj" => SourceType::Doaj,
            "pubmed" => SourceType::PubMed,
            other => SourceType::Other(other.to_string()),
        }
    }

    /// Returns the display name of the source
    pub fn name(&self) -> &str {
        match self {
            SourceType::OpenAlex => "OpenAlex",
            SourceType::Arxiv => "arXiv",
            SourceType::CrossRef => "CrossRef",
            SourceType::EuropePMC => "Europe PMC",
            SourceType::Pygetpapers => "pygetpapers",
            SourceType::Doaj => "DOAJ",
            SourceType::PubMed => "PubMed",
            SourceType::Other(s) => s,
        }
    }

    /// Returns the provider identifier
    pub fn id(&self) -> &str {
        match self {
            SourceType::OpenAlex => "openalex",
            SourceType::Arxiv => "arxiv",
            SourceType::CrossRef => "crossref",
            SourceType::EuropePMC => "europe_pmc",
            SourceType::Pygetpapers => "pygetpapers",
            SourceType::Doaj => "doaj",
            SourceType::PubMed => "pubmed",
            SourceType::Other(s) => s,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A research paper in canonical form
///
/// Every provider's raw record is mapped into this shape before papers from
/// different providers are merged. Papers are never mutated after they leave
/// the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    /// Provider-local identifier or DOI
    pub id: String,

    /// Paper title (may be empty)
    pub title: String,

    /// Authors in byline order
    pub authors: Vec<String>,

    /// Abstract text (may be empty or a placeholder)
    pub r#abstract: String,

    /// Four-digit publication year, or empty
    pub year: String,

    /// ISO-8601 publication date, or empty
    pub published_date: String,

    /// Canonical link or DOI URL
    pub url: String,

    /// Journal or venue name
    pub journal: String,

    /// Citation count
    pub citations: u32,

    /// Digital Object Identifier, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    /// Provider the paper came from
    pub source: SourceType,
}

impl Paper {
    /// Create a new paper with required fields
    pub fn new(id: String, title: String, url: String, source: SourceType) -> Self {
        Self {
            id,
            title,
            authors: Vec::new(),
            r#abstract: String::new(),
            year: String::new(),
            published_date: String::new(),
            url,
            journal: String::new(),
            citations: 0,
            doi: None,
            source,
        }
    }

    /// First author, if any
    pub fn first_author(&self) -> Option<&str> {
        self.authors.first().map(|s| s.as_str())
    }

    /// The most precise publication date available: the full date when
    /// present, else the year
    pub fn date_key(&self) -> &str {
        if self.published_date.is_empty() {
            &self.year
        } else {
            &self.published_date
        }
    }
}

/// Builder for constructing Paper objects
#[derive(Debug, Clone)]
pub struct PaperBuilder {
    paper: Paper,
}

impl PaperBuilder {
    /// Create a new builder with required fields
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        source: SourceType,
    ) -> Self {
        Self {
            paper: Paper::new(id.into(), title.into(), url.into(), source),
        }
    }

    /// Set authors
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paper.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    /// Set abstract
    pub fn abstract_text(mut self, abstract_text: impl Into<String>) -> Self {
        self.paper.r#abstract = abstract_text.into();
        self
    }

    /// Set publication year
    pub fn year(mut self, year: impl Into<String>) -> Self {
        self.paper.year = year.into();
        self
    }

    /// Set publication date
    pub fn published_date(mut self, date: impl Into<String>) -> Self {
        self.paper.published_date = date.into();
        self
    }

    /// Set journal
    pub fn journal(mut self, journal: impl Into<String>) -> Self {
        self.paper.journal = journal.into();
        self
    }

    /// Set citation count
    pub fn citations(mut self, count: u32) -> Self {
        self.paper.citations = count;
        self
    }

    /// Set DOI; empty values are ignored
    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        let doi = doi.into();
        if !doi.is_empty() {
            self.paper.doi = Some(doi);
        }
        self
    }

    /// Build the Paper
    pub fn build(self) -> Paper {
        self.paper
    }
}
