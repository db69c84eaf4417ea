//! Recency ordering of a deduplicated result set.

use std::cmp::Ordering;

use crate::models::Paper;

/// Compare two papers for ranking: newer date key first, and for equal date
/// keys the lexicographically later title first
pub fn compare(a: &Paper, b: &Paper) -> Ordering {
    b.date_key()
        .cmp(a.date_key())
        .then_with(|| b.title.cmp(&a.title))
}

/// Order papers by recency.
///
/// Dates are compared as opaque strings, so ISO-8601 dates and bare years both
/// sort correctly. The sort is stable.
pub fn rank(mut papers: Vec<Paper>) -> Vec<Paper> {
    papers.sort_by(compare);
    papers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaperBuilder, SourceType};

    fn dated(id: &str, title: &str, year: &str, date: &str) -> Paper {
        PaperBuilder::new(id, title, "", SourceType::OpenAlex)
            .year(year)
            .published_date(date)
            .build()
    }

    #[test]
    fn test_rank_newest_first() {
        let papers = vec![
            dated("1", "Old", "2001", ""),
            dated("2", "New", "2023", "2023-05-01"),
            dated("3", "Middle", "2015", ""),
        ];

        let ids: Vec<_> = rank(papers).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn test_equal_dates_later_title_first() {
        let papers = vec![
            dated("1", "Alpha", "2020", ""),
            dated("2", "Gamma", "2020", ""),
            dated("3", "Beta", "2020", ""),
        ];

        let titles: Vec<_> = rank(papers).into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["Gamma", "Beta", "Alpha"]);
    }

    #[test]
    fn test_empty_dates_sort_last() {
        let papers = vec![dated("1", "Undated", "", ""), dated("2", "Dated", "1999", "")];

        let ids: Vec<_> = rank(papers).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[test]
    fn test_rank_is_deterministic() {
        let papers = vec![
            dated("1", "Same", "2020", ""),
            dated("2", "Same", "2020", ""),
            dated("3", "Other", "2021", "2021-01-01"),
        ];

        let once = rank(papers.clone());
        assert_eq!(once, rank(papers));
        assert_eq!(once, rank(once.clone()));
        // Full ties keep input order
        assert_eq!(once[1].id, "1");
        assert_eq!(once[2].id, "2");
    }
}
