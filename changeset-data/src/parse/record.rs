//! Acceptance filter and conversion from raw elements into domain records.

use std::str::FromStr;

use changeset_core::{BoundingBox, Changeset, Comment, Enrichment, Tags};
use chrono::{DateTime, Utc};

use super::error::ParseError;
use super::reader::{RawComment, RawElement};

/// Attributes every accepted element must carry.
pub const REQUIRED_ATTRIBUTES: [&str; 9] = [
    "id",
    "uid",
    "open",
    "created_at",
    "closed_at",
    "min_lon",
    "max_lon",
    "min_lat",
    "max_lat",
];

const CHANGESET: &str = "changeset";

/// Whether an element passes the acceptance filter.
///
/// Checks run in order: every required attribute is present, the element is
/// a changeset, and it is closed (`open="false"`).
#[must_use]
pub fn is_accepted(element: &RawElement) -> bool {
    REQUIRED_ATTRIBUTES
        .iter()
        .all(|name| element.attributes.contains_key(*name))
        && element.name == CHANGESET
        && element.attribute("open") == Some("false")
}

/// Parse the bounding box of an accepted element.
///
/// # Errors
/// Returns [`ParseError::InvalidNumber`] when a bound is missing or is not a
/// number.
pub fn bounding_box(element: &RawElement) -> Result<BoundingBox, ParseError> {
    Ok(BoundingBox::new(
        number(element, "min_lon")?,
        number(element, "max_lon")?,
        number(element, "min_lat")?,
        number(element, "max_lat")?,
    ))
}

/// Build the changeset and its comments from an accepted, enriched element.
///
/// # Errors
/// Returns a [`ParseError`] when an id, count or timestamp is malformed.
pub fn into_records(
    element: RawElement,
    bbox: BoundingBox,
    enrichment: Enrichment,
) -> Result<(Changeset, Vec<Comment>), ParseError> {
    let id: i64 = number(&element, "id")?;
    let comments = element
        .comments
        .iter()
        .map(|comment| into_comment(&element, id, comment))
        .collect::<Result<Vec<_>, _>>()?;
    let num_changes = element
        .attribute("num_changes")
        .map(|_| number(&element, "num_changes"))
        .transpose()?;
    let changeset = Changeset {
        id,
        user_id: number(&element, "uid")?,
        user_name: element.attribute("user").map(str::to_owned),
        created_at: timestamp(&element, "created_at", element.attribute("created_at"))?,
        closed_at: timestamp(&element, "closed_at", element.attribute("closed_at"))?,
        bbox,
        centroid: enrichment.centroid,
        num_changes,
        tags: element.tags.into_iter().collect::<Tags>(),
        attribution: enrichment.attribution,
    };
    Ok((changeset, comments))
}

fn into_comment(
    element: &RawElement,
    changeset_id: i64,
    comment: &RawComment,
) -> Result<Comment, ParseError> {
    let user_id = comment
        .attribute("uid")
        .map(|raw| parse_number(element, "comment uid", raw))
        .transpose()?;
    let date = comment
        .attribute("date")
        .map(|raw| timestamp(element, "comment date", Some(raw)))
        .transpose()?;
    Ok(Comment {
        changeset_id,
        user_id,
        user_name: comment.attribute("user").map(str::to_owned),
        date,
        text: comment.text.clone(),
    })
}

fn changeset_label(element: &RawElement) -> String {
    element.attribute("id").unwrap_or("?").to_owned()
}

fn number<T: FromStr>(element: &RawElement, attribute: &'static str) -> Result<T, ParseError> {
    parse_number(element, attribute, element.attribute(attribute).unwrap_or_default())
}

fn parse_number<T: FromStr>(
    element: &RawElement,
    attribute: &'static str,
    raw: &str,
) -> Result<T, ParseError> {
    raw.trim().parse().map_err(|_| ParseError::InvalidNumber {
        changeset_id: changeset_label(element),
        attribute,
        value: raw.to_owned(),
    })
}

fn timestamp(
    element: &RawElement,
    attribute: &'static str,
    raw: Option<&str>,
) -> Result<DateTime<Utc>, ParseError> {
    let value = raw.unwrap_or_default();
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| ParseError::InvalidTimestamp {
            changeset_id: changeset_label(element),
            attribute,
            value: value.to_owned(),
            source,
        })
}
