//! Tag index over a collection of articles

use std::collections::{BTreeMap, BTreeSet};

use super::ArticleRecord;

/// Every distinct tag across `records`, case-sensitive, sorted
pub fn all_tags<'a, I>(records: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ArticleRecord>,
{
    records
        .into_iter()
        .flat_map(|record| record.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Records carrying `tag`, in their input order
pub fn by_tag<'a>(records: &'a [ArticleRecord], tag: &str) -> Vec<&'a ArticleRecord> {
    records
        .iter()
        .filter(|record| record.tags.iter().any(|t| t == tag))
        .collect()
}

/// Number of records per tag, sorted by tag name
pub fn tag_counts(records: &[ArticleRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for tag in records.iter().flat_map(|r| r.tags.iter()) {
        *counts.entry(tag.clone()).or_insert(0) += 1;
    }
    counts
}
