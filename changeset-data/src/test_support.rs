//! Shared fixtures for parser, store and replication tests.
//!
//! [`sample_enricher`] covers a box around the northern Philippines with one
//! region, province and city nested around the default changeset extent of
//! [`ChangesetXml`].

use std::fmt::Write as _;

use changeset_core::{AdminBoundaries, BoundaryDataset, BoundaryFeature, Enricher};
use geo::{MultiPolygon, polygon};

/// Root timestamp written by [`dump_xml`].
pub const DUMP_TIMESTAMP: &str = "2024-03-01T00:00:02Z";

/// Axis-aligned rectangle as a single-member multipolygon.
#[must_use]
pub fn rectangle(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![
        (x: min_lon, y: min_lat),
        (x: max_lon, y: min_lat),
        (x: max_lon, y: max_lat),
        (x: min_lon, y: max_lat),
    ]])
}

/// Boundaries with one named feature per level, all containing
/// `(120.95, 14.55)`.
#[must_use]
pub fn sample_boundaries() -> AdminBoundaries {
    AdminBoundaries::new(
        rectangle(116.0, 127.0, 4.0, 21.0),
        BoundaryDataset::new(vec![BoundaryFeature::new(
            Some("Luzon".into()),
            "relation/100",
            rectangle(119.0, 123.0, 12.0, 19.0),
        )]),
        BoundaryDataset::new(vec![BoundaryFeature::new(
            Some("Metro".into()),
            "relation/200",
            rectangle(120.8, 121.2, 14.3, 14.9),
        )]),
        BoundaryDataset::new(vec![BoundaryFeature::new(
            Some("Manila".into()),
            "relation/300",
            rectangle(120.9, 121.05, 14.5, 14.65),
        )]),
    )
}

/// Enricher over [`sample_boundaries`].
#[must_use]
pub fn sample_enricher() -> Enricher {
    Enricher::new(sample_boundaries())
}

/// Builder for one `<changeset>` element.
#[derive(Debug, Clone)]
pub struct ChangesetXml {
    id: i64,
    open: bool,
    bounds: [f64; 4],
    tags: Vec<(String, String)>,
    comments: Vec<(i64, Option<String>)>,
    omitted: Option<&'static str>,
}

impl ChangesetXml {
    /// A closed changeset whose centroid is `(120.95, 14.55)`.
    #[must_use]
    pub fn closed(id: i64) -> Self {
        Self {
            id,
            open: false,
            bounds: [120.9, 121.0, 14.5, 14.6],
            tags: Vec::new(),
            comments: Vec::new(),
            omitted: None,
        }
    }

    /// An open changeset with the default extent.
    #[must_use]
    pub fn open(id: i64) -> Self {
        Self {
            open: true,
            ..Self::closed(id)
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Self {
        self.bounds = [min_lon, max_lon, min_lat, max_lat];
        self
    }

    /// Move the extent well outside the sample coarse boundary.
    #[must_use]
    pub fn outside(self) -> Self {
        self.with_bounds(130.0, 131.0, 30.0, 31.0)
    }

    #[must_use]
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Add a discussion comment; `None` omits the `<text>` child.
    #[must_use]
    pub fn with_comment(mut self, uid: i64, text: Option<&str>) -> Self {
        self.comments.push((uid, text.map(str::to_owned)));
        self
    }

    /// Leave out one attribute when rendering.
    #[must_use]
    pub fn without(mut self, attribute: &'static str) -> Self {
        self.omitted = Some(attribute);
        self
    }

    /// Render the element.
    #[must_use]
    pub fn render(&self) -> String {
        let [min_lon, max_lon, min_lat, max_lat] = self.bounds;
        let attributes = [
            ("id", self.id.to_string()),
            ("created_at", "2024-02-29T10:00:00Z".to_owned()),
            ("closed_at", "2024-02-29T11:00:00Z".to_owned()),
            ("open", self.open.to_string()),
            ("user", format!("mapper{}", self.id)),
            ("uid", (self.id + 1000).to_string()),
            ("min_lat", min_lat.to_string()),
            ("min_lon", min_lon.to_string()),
            ("max_lat", max_lat.to_string()),
            ("max_lon", max_lon.to_string()),
            ("comments_count", self.comments.len().to_string()),
            ("num_changes", "3".to_owned()),
        ];
        let mut xml = String::from("<changeset");
        for (name, value) in attributes {
            if self.omitted != Some(name) {
                let _ = write!(xml, " {name}=\"{value}\"");
            }
        }
        xml.push('>');
        for (key, value) in &self.tags {
            let _ = write!(xml, "<tag k=\"{key}\" v=\"{value}\"/>");
        }
        if !self.comments.is_empty() {
            xml.push_str("<discussion>");
            for (uid, text) in &self.comments {
                let _ = write!(
                    xml,
                    "<comment uid=\"{uid}\" user=\"commenter{uid}\" date=\"2024-02-29T12:00:00Z\">"
                );
                if let Some(text) = text {
                    let _ = write!(xml, "<text>{text}</text>");
                }
                xml.push_str("</comment>");
            }
            xml.push_str("</discussion>");
        }
        xml.push_str("</changeset>");
        xml
    }
}

/// Wrap changesets in an `<osm>` root stamped with [`DUMP_TIMESTAMP`].
#[must_use]
pub fn dump_xml(changesets: &[ChangesetXml]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<osm version=\"0.6\" timestamp=\"{DUMP_TIMESTAMP}\">\n"
    );
    for changeset in changesets {
        xml.push_str(&changeset.render());
        xml.push('\n');
    }
    xml.push_str("</osm>\n");
    xml
}
