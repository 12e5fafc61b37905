//! Geospatial enrichment of changeset bounding boxes.
//!
//! Provides the bounding-box midpoint, the coarse membership test used to
//! admit changesets, and the first-match administrative lookup.

use geo::{Contains, MultiPolygon, Point};

use crate::boundary::{AdminBoundaries, BoundaryDataset};
use crate::changeset::{AdminAttribution, BoundingBox};

/// Arithmetic midpoint of a bounding box.
///
/// This is not an area centroid; callers must not treat it as one.
///
/// # Examples
/// ```
/// use changeset_core::centroid;
///
/// let point = centroid(120.9, 121.0, 14.5, 14.6);
/// assert!((point.x() - 120.95).abs() < 1e-9);
/// assert!((point.y() - 14.55).abs() < 1e-9);
/// ```
#[must_use]
pub fn centroid(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Point<f64> {
    Point::new((min_lon + max_lon) / 2.0, (min_lat + max_lat) / 2.0)
}

/// Return whether `point` lies strictly inside the coarse boundary.
///
/// Points on the boundary itself are outside.
#[must_use]
pub fn in_region(boundary: &MultiPolygon<f64>, point: &Point<f64>) -> bool {
    boundary.contains(point)
}

/// Find the first named feature containing `point`, in dataset order.
///
/// Returns the feature identifier with the relation prefix stripped. The scan
/// is deliberately first-match rather than smallest-area; reordering a
/// dataset changes attribution.
///
/// # Examples
/// ```
/// use geo::{MultiPolygon, Point, polygon};
/// use changeset_core::{BoundaryDataset, BoundaryFeature, locate_admin_unit};
///
/// let square = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0)];
/// let dataset = BoundaryDataset::new(vec![BoundaryFeature::new(
///     Some("Square".into()),
///     "relation/42",
///     MultiPolygon::new(vec![square]),
/// )]);
/// assert_eq!(locate_admin_unit(&dataset, &Point::new(1.0, 1.0)), Some("42"));
/// assert_eq!(locate_admin_unit(&dataset, &Point::new(3.0, 1.0)), None);
/// ```
#[must_use]
pub fn locate_admin_unit<'a>(dataset: &'a BoundaryDataset, point: &Point<f64>) -> Option<&'a str> {
    dataset
        .features()
        .iter()
        .find(|feature| feature.name.is_some() && feature.geometry.contains(point))
        .map(|feature| feature.identifier())
}

/// Administrative nesting levels used for attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminLevel {
    /// Top-level regions.
    Region,
    /// Provinces.
    Province,
    /// Cities and municipalities.
    City,
}

/// Result of enriching an admitted changeset.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    /// Bounding-box midpoint.
    pub centroid: Point<f64>,
    /// Independently resolved administrative units.
    pub attribution: AdminAttribution,
}

/// Applies the membership filter and administrative lookups per record.
#[derive(Debug, Clone)]
pub struct Enricher {
    boundaries: AdminBoundaries,
}

impl Enricher {
    /// Wrap a loaded set of boundaries.
    #[must_use]
    pub const fn new(boundaries: AdminBoundaries) -> Self {
        Self { boundaries }
    }

    /// Boundaries backing this enricher.
    #[must_use]
    pub const fn boundaries(&self) -> &AdminBoundaries {
        &self.boundaries
    }

    /// Locate `point` within a single administrative level.
    #[must_use]
    pub fn locate(&self, level: AdminLevel, point: &Point<f64>) -> Option<&str> {
        let dataset = match level {
            AdminLevel::Region => &self.boundaries.regions,
            AdminLevel::Province => &self.boundaries.provinces,
            AdminLevel::City => &self.boundaries.cities,
        };
        locate_admin_unit(dataset, point)
    }

    /// Enrich a bounding box, returning `None` when its midpoint falls outside
    /// the coarse boundary.
    #[must_use]
    pub fn enrich(&self, bbox: &BoundingBox) -> Option<Enrichment> {
        let point = bbox.centroid();
        if !in_region(&self.boundaries.coarse, &point) {
            return None;
        }
        let attribution = AdminAttribution {
            city_id: self.locate(AdminLevel::City, &point).map(str::to_owned),
            province_id: self.locate(AdminLevel::Province, &point).map(str::to_owned),
            region_id: self.locate(AdminLevel::Region, &point).map(str::to_owned),
        };
        Some(Enrichment {
            centroid: point,
            attribution,
        })
    }
}
