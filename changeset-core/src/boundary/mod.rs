//! Administrative boundary datasets used to attribute changesets.
//!
//! A run loads one coarse membership polygon plus three ordered datasets of
//! named features (regions, provinces and cities). Datasets are immutable once
//! loaded; feature order is significant because lookups are first-match.

use geo::MultiPolygon;

#[cfg(feature = "serde")]
mod geojson;

#[cfg(feature = "serde")]
pub use geojson::{
    BoundaryError, CITIES_FILE, NATIONAL_FILE, PROVINCES_FILE, REGIONS_FILE,
};

/// Prefix carried by relation identifiers in boundary exports.
pub const RELATION_PREFIX: &str = "relation/";

/// A single administrative polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFeature {
    /// Display name. Features without a name never match a lookup.
    pub name: Option<String>,
    /// Raw identifier as exported, for example `relation/443174`.
    pub relation_id: String,
    /// Feature geometry; plain polygons are stored as single-member sets.
    pub geometry: MultiPolygon<f64>,
}

impl BoundaryFeature {
    /// Construct a feature from its parts.
    #[must_use]
    pub fn new(
        name: Option<String>,
        relation_id: impl Into<String>,
        geometry: MultiPolygon<f64>,
    ) -> Self {
        Self {
            name,
            relation_id: relation_id.into(),
            geometry,
        }
    }

    /// Identifier with the relation prefix removed.
    ///
    /// Identifiers without the prefix are returned unchanged.
    ///
    /// # Examples
    /// ```
    /// use geo::MultiPolygon;
    /// use changeset_core::BoundaryFeature;
    ///
    /// let feature = BoundaryFeature::new(None, "relation/443174", MultiPolygon::new(vec![]));
    /// assert_eq!(feature.identifier(), "443174");
    /// ```
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.relation_id
            .strip_prefix(RELATION_PREFIX)
            .unwrap_or(&self.relation_id)
    }
}

/// Ordered collection of features for one administrative level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryDataset {
    features: Vec<BoundaryFeature>,
}

impl BoundaryDataset {
    /// Wrap features, preserving their order.
    #[must_use]
    pub const fn new(features: Vec<BoundaryFeature>) -> Self {
        Self { features }
    }

    /// Features in stored order.
    #[must_use]
    pub const fn features(&self) -> &[BoundaryFeature] {
        self.features.as_slice()
    }

    /// Number of features.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the dataset holds no features.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FromIterator<BoundaryFeature> for BoundaryDataset {
    fn from_iter<I: IntoIterator<Item = BoundaryFeature>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Complete boundary set for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminBoundaries {
    /// Coarse membership polygon used as the admission filter.
    pub coarse: MultiPolygon<f64>,
    /// Region features.
    pub regions: BoundaryDataset,
    /// Province features.
    pub provinces: BoundaryDataset,
    /// City and municipality features.
    pub cities: BoundaryDataset,
}

impl AdminBoundaries {
    /// Assemble boundaries from a coarse polygon and three datasets.
    #[must_use]
    pub const fn new(
        coarse: MultiPolygon<f64>,
        regions: BoundaryDataset,
        provinces: BoundaryDataset,
        cities: BoundaryDataset,
    ) -> Self {
        Self {
            coarse,
            regions,
            provinces,
            cities,
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests;
