//! Mapping of provider records into the canonical [`Paper`] shape.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::models::Paper;

/// Placeholder abstract for records that carry none
pub const NO_ABSTRACT: &str = "No abstract available";

/// A provider-specific raw record that knows how to map itself into a [`Paper`].
///
/// Implementations must be pure: field extraction and defaulting only.
pub trait RawRecord {
    fn into_paper(self, source: &str) -> Paper;
}

/// Normalize one raw record.
///
/// Returns `None` when the resulting paper would have neither a title nor a
/// real abstract.
pub fn normalize<R: RawRecord>(record: R, source: &str) -> Option<Paper> {
    let paper = record.into_paper(source);
    let has_title = !paper.title.trim().is_empty();
    let has_abstract = !paper.r#abstract.trim().is_empty() && paper.r#abstract != NO_ABSTRACT;

    if has_title || has_abstract {
        Some(paper)
    } else {
        None
    }
}

/// Deserialize and normalize a list of JSON records one by one.
///
/// A record that does not match the provider schema is logged and skipped; it
/// never fails the whole batch.
pub fn normalize_values<R>(records: Vec<Value>, source: &str) -> Vec<Paper>
where
    R: RawRecord + DeserializeOwned,
{
    let total = records.len();
    let papers: Vec<Paper> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<R>(value) {
            Ok(record) => normalize(record, source),
            Err(e) => {
                tracing::warn!(source, index, error = %e, "Skipping malformed record");
                None
            }
        })
        .collect();

    if papers.len() < total {
        tracing::debug!(source, kept = papers.len(), total, "Dropped unusable records");
    }
    papers
}

/// Rebuild an abstract from an inverted index (word -> positions).
///
/// Each word is placed at every recorded position and the words are joined in
/// position order. When two words claim the same position the
/// lexicographically greater one is kept. An empty index yields [`NO_ABSTRACT`].
pub fn reconstruct_abstract(index: &HashMap<String, Vec<usize>>) -> String {
    let mut words: Vec<(&String, &Vec<usize>)> = index.iter().collect();
    words.sort_by(|a, b| a.0.cmp(b.0));

    let mut positioned: BTreeMap<usize, &str> = BTreeMap::new();
    for (word, positions) in words {
        for &pos in positions {
            positioned.insert(pos, word.as_str());
        }
    }

    if positioned.is_empty() {
        return NO_ABSTRACT.to_string();
    }

    positioned.into_values().collect::<Vec<_>>().join(" ")
}

/// First four characters of a date string, when they form a year
pub fn year_of(date: &str) -> String {
    match date.get(..4) {
        Some(year) if year.chars().all(|c| c.is_ascii_digit()) => year.to_string(),
        _ => String::new(),
    }
}
