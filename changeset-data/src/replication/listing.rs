//! Scraping of the feed's directory index pages.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

const LISTING_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Matches `<a href="NNN...">...</a>   YYYY-MM-DD HH:MM`.
static LISTING_ENTRY: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r#"<a href="(?P<group>[0-9]{3})[^"]*">[^<]*</a>\s*(?P<published>[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2})"#,
    )
});

/// One child of a directory index, keyed by its three-digit group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Three-digit directory or file group.
    pub group: String,
    /// Publication time shown in the index, minute precision, UTC.
    pub published: DateTime<Utc>,
}

/// Extract the children of an index page, ordered by group.
///
/// A leaf directory lists both `NNN.osm.gz` and `NNN.state.txt`; entries
/// sharing a group collapse into one that keeps the latest time, so a group
/// qualifies as soon as any of its files is published at or after a target.
/// Lines without a timestamp, such as the parent link, are ignored.
///
/// # Errors
/// Returns the regex compilation error if the built-in pattern is rejected.
///
/// # Examples
/// ```
/// use changeset_data::replication::parse_listing;
///
/// let html = r#"<a href="../">../</a>
/// <a href="004/">004/</a>    2023-11-02 08:15    -
/// <a href="005/">005/</a>    2024-06-30 23:59    -"#;
/// let entries = parse_listing(html)?;
/// assert_eq!(entries.len(), 2);
/// assert_eq!(entries[1].group, "005");
/// # Ok::<(), regex::Error>(())
/// ```
pub fn parse_listing(html: &str) -> Result<Vec<ListingEntry>, regex::Error> {
    let pattern = LISTING_ENTRY.as_ref().map_err(Clone::clone)?;
    let mut latest: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
    for captures in pattern.captures_iter(html) {
        let (Some(group), Some(published)) = (captures.name("group"), captures.name("published"))
        else {
            continue;
        };
        let Ok(published) = NaiveDateTime::parse_from_str(published.as_str(), LISTING_TIME_FORMAT)
        else {
            continue;
        };
        let published = published.and_utc();
        latest
            .entry(group.as_str().to_owned())
            .and_modify(|seen| *seen = (*seen).max(published))
            .or_insert(published);
    }
    Ok(latest
        .into_iter()
        .map(|(group, published)| ListingEntry { group, published })
        .collect())
}

/// Pick the entry published nearest at or after `target`.
///
/// Entries published strictly before `target` are ignored; an entry
/// published exactly at `target` is a valid match. Ties go to the lower
/// group.
#[must_use]
pub fn choose_successor(entries: &[ListingEntry], target: DateTime<Utc>) -> Option<&ListingEntry> {
    entries
        .iter()
        .filter(|entry| entry.published >= target)
        .min_by_key(|entry| entry.published - target)
}
