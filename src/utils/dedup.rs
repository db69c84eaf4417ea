//! Deduplication of papers merged from several providers.

use std::collections::HashSet;

use crate::models::Paper;

/// Identity of a publication: lowercased trimmed title and first author
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub title: String,
    pub first_author: String,
}

impl DedupKey {
    /// Derive the key for a paper
    pub fn of(paper: &Paper) -> Self {
        Self {
            title: paper.title.trim().to_lowercase(),
            first_author: paper
                .first_author()
                .map(|a| a.trim().to_lowercase())
                .unwrap_or_default(),
        }
    }
}

/// Remove duplicate papers, keeping the first occurrence of each key.
///
/// Stable: survivors keep their input order. Runs in O(n).
pub fn dedupe(papers: Vec<Paper>) -> Vec<Paper> {
    let mut seen: HashSet<DedupKey> = HashSet::with_capacity(papers.len());
    papers
        .into_iter()
        .filter(|paper| seen.insert(DedupKey::of(paper)))
        .collect()
}
