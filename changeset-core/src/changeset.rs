//! Finalised changeset records and their discussion comments.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use geo::{Coord, Point, Rect};

use crate::enrich::centroid;

/// Free-form key/value tags attached to a changeset.
///
/// Inserting a duplicate key overwrites the previous value, so the last tag
/// seen in a dump wins.
pub type Tags = BTreeMap<String, String>;

/// Bounding box of the edits recorded by a changeset.
///
/// Coordinates are WGS84 degrees.
///
/// # Examples
/// ```
/// use changeset_core::BoundingBox;
///
/// let bbox = BoundingBox::new(120.9, 121.0, 14.5, 14.6);
/// let centre = bbox.centroid();
/// assert!((centre.x() - 120.95).abs() < 1e-9);
/// assert!((centre.y() - 14.55).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Western edge.
    pub min_lon: f64,
    /// Eastern edge.
    pub max_lon: f64,
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
}

impl BoundingBox {
    /// Construct a bounding box from its four scalar bounds.
    #[must_use]
    pub const fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    /// Midpoint of the box. See [`centroid`].
    #[must_use]
    pub fn centroid(&self) -> Point<f64> {
        centroid(self.min_lon, self.max_lon, self.min_lat, self.max_lat)
    }

    /// Rectangle geometry spanning the box.
    #[must_use]
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_lon,
                y: self.min_lat,
            },
            Coord {
                x: self.max_lon,
                y: self.max_lat,
            },
        )
    }
}

/// Administrative units whose polygons contain a changeset centroid.
///
/// Each level is resolved independently, so a city may be reported together
/// with a province that does not contain it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminAttribution {
    /// City or municipality relation id.
    pub city_id: Option<String>,
    /// Province relation id.
    pub province_id: Option<String>,
    /// Region relation id.
    pub region_id: Option<String>,
}

/// A closed changeset ready to be written to the store.
///
/// Only closed changesets are ever constructed by the parser, so the record
/// carries no open flag; the store always writes `open = false`.
#[derive(Debug, Clone, PartialEq)]
pub struct Changeset {
    /// Upstream changeset id.
    pub id: i64,
    /// Author account id.
    pub user_id: i64,
    /// Author display name, when the dump includes one.
    pub user_name: Option<String>,
    /// When the changeset was opened.
    pub created_at: DateTime<Utc>,
    /// When the changeset was closed.
    pub closed_at: DateTime<Utc>,
    /// Extent of the edits.
    pub bbox: BoundingBox,
    /// Bounding-box midpoint, `x = longitude`, `y = latitude`.
    pub centroid: Point<f64>,
    /// Number of edits, when reported.
    pub num_changes: Option<i64>,
    /// Changeset tags.
    pub tags: Tags,
    /// Administrative attribution of the centroid.
    pub attribution: AdminAttribution,
}

/// A discussion comment attached to a changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Parent changeset id.
    pub changeset_id: i64,
    /// Commenter account id; historical comments may lack one.
    pub user_id: Option<i64>,
    /// Commenter display name.
    pub user_name: Option<String>,
    /// When the comment was posted.
    pub date: Option<DateTime<Utc>>,
    /// Comment body. Empty when the dump carries no text for the comment.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn rect_spans_bounds() {
        let bbox = BoundingBox::new(-1.0, 2.0, -3.0, 4.0);
        let rect = bbox.to_rect();
        assert_eq!(rect.min(), Coord { x: -1.0, y: -3.0 });
        assert_eq!(rect.max(), Coord { x: 2.0, y: 4.0 });
    }

    #[rstest]
    fn tags_keep_last_value() {
        let mut tags = Tags::new();
        tags.insert("comment".into(), "first".into());
        tags.insert("comment".into(), "second".into());
        assert_eq!(tags.get("comment").map(String::as_str), Some("second"));
        assert_eq!(tags.len(), 1);
    }
}
