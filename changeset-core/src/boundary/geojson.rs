//! GeoJSON decoding for boundary datasets.
//!
//! Only `Polygon` and `MultiPolygon` geometries are supported. Features
//! without an `@id` property or a supported geometry are skipped with a
//! warning rather than failing the whole dataset.

use std::io::{self, Read};

use geo::{Coord, LineString, MultiPolygon, Polygon};
use log::warn;
use serde::Deserialize;
use thiserror::Error;

use super::{AdminBoundaries, BoundaryDataset, BoundaryFeature};

/// File holding the coarse national polygon; only its first feature is used.
pub const NATIONAL_FILE: &str = "l2_national.geojson";
/// File holding region features.
pub const REGIONS_FILE: &str = "l3_regions.geojson";
/// File holding province features.
pub const PROVINCES_FILE: &str = "l4_provinces.geojson";
/// File holding city and municipality features.
pub const CITIES_FILE: &str = "l6_cities_municipalities.geojson";

/// Errors raised while loading boundary datasets.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("failed to open boundary file '{file}'")]
    Open {
        file: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode GeoJSON in '{file}'")]
    Decode {
        file: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("'{file}' contains no usable polygon for the coarse boundary")]
    MissingCoarse { file: String },
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    #[serde(default)]
    features: Vec<RawFeature>,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    #[serde(default)]
    properties: Option<RawProperties>,
    #[serde(default)]
    geometry: Option<RawGeometry>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProperties {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "@id")]
    id: Option<String>,
}

type RawRing = Vec<Vec<f64>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawGeometry {
    Polygon {
        coordinates: Vec<RawRing>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<RawRing>>,
    },
    #[serde(other)]
    Unsupported,
}

impl RawGeometry {
    fn into_multi_polygon(self) -> Option<MultiPolygon<f64>> {
        match self {
            Self::Polygon { coordinates } => {
                convert_polygon(coordinates).map(|polygon| MultiPolygon::new(vec![polygon]))
            }
            Self::MultiPolygon { coordinates } => coordinates
                .into_iter()
                .map(convert_polygon)
                .collect::<Option<Vec<_>>>()
                .map(MultiPolygon::new),
            Self::Unsupported => None,
        }
    }
}

fn convert_polygon(raw_rings: Vec<RawRing>) -> Option<Polygon<f64>> {
    let mut rings = raw_rings.into_iter().map(convert_ring);
    let exterior = rings.next()??;
    let interiors = rings.collect::<Option<Vec<_>>>()?;
    Some(Polygon::new(exterior, interiors))
}

fn convert_ring(ring: RawRing) -> Option<LineString<f64>> {
    ring.into_iter()
        .map(|position| {
            Some(Coord {
                x: *position.first()?,
                y: *position.get(1)?,
            })
        })
        .collect::<Option<Vec<_>>>()
        .map(LineString::new)
}

fn decode_collection<R: Read>(reader: R, file: &str) -> Result<RawCollection, BoundaryError> {
    serde_json::from_reader(reader).map_err(|source| BoundaryError::Decode {
        file: file.to_owned(),
        source,
    })
}

impl BoundaryDataset {
    /// Decode a GeoJSON feature collection, preserving feature order.
    ///
    /// `file` names the source in errors and warnings.
    ///
    /// # Errors
    /// Returns [`BoundaryError::Decode`] when the document is not a valid
    /// feature collection.
    ///
    /// # Examples
    /// ```
    /// use changeset_core::BoundaryDataset;
    ///
    /// let json = r#"{"type":"FeatureCollection","features":[{
    ///     "type":"Feature",
    ///     "properties":{"name":"Square","@id":"relation/9"},
    ///     "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}
    /// }]}"#;
    /// let dataset = BoundaryDataset::from_geojson_reader(json.as_bytes(), "inline")?;
    /// assert_eq!(dataset.len(), 1);
    /// assert_eq!(dataset.features()[0].identifier(), "9");
    /// # Ok::<(), changeset_core::BoundaryError>(())
    /// ```
    pub fn from_geojson_reader<R: Read>(reader: R, file: &str) -> Result<Self, BoundaryError> {
        let collection = decode_collection(reader, file)?;
        let features = collection
            .features
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| convert_feature(raw, index, file))
            .collect();
        Ok(Self::new(features))
    }
}

fn convert_feature(raw: RawFeature, index: usize, file: &str) -> Option<BoundaryFeature> {
    let properties = raw.properties.unwrap_or_default();
    let Some(relation_id) = properties.id else {
        warn!("skipping feature {index} in {file}: missing @id property");
        return None;
    };
    let Some(geometry) = raw.geometry.and_then(RawGeometry::into_multi_polygon) else {
        warn!("skipping feature {relation_id} in {file}: unsupported or malformed geometry");
        return None;
    };
    Some(BoundaryFeature::new(properties.name, relation_id, geometry))
}

/// Decode the coarse boundary: the geometry of the first feature.
///
/// # Errors
/// Returns [`BoundaryError::MissingCoarse`] when the first feature has no
/// usable polygon geometry.
fn coarse_from_geojson_reader<R: Read>(
    reader: R,
    file: &str,
) -> Result<MultiPolygon<f64>, BoundaryError> {
    decode_collection(reader, file)?
        .features
        .into_iter()
        .next()
        .and_then(|feature| feature.geometry)
        .and_then(RawGeometry::into_multi_polygon)
        .ok_or_else(|| BoundaryError::MissingCoarse {
            file: file.to_owned(),
        })
}

impl AdminBoundaries {
    /// Load the four boundary files through `open`, which maps a file name
    /// to a reader.
    ///
    /// Keeping file access injectable lets callers decide how a boundaries
    /// directory is resolved.
    ///
    /// # Errors
    /// Returns [`BoundaryError::Open`] when `open` fails, or a decoding error
    /// from any of the files.
    pub fn load_with<R, F>(mut open: F) -> Result<Self, BoundaryError>
    where
        R: Read,
        F: FnMut(&str) -> io::Result<R>,
    {
        let mut reader_for = |file: &str| {
            open(file).map_err(|source| BoundaryError::Open {
                file: file.to_owned(),
                source,
            })
        };
        let coarse = coarse_from_geojson_reader(reader_for(NATIONAL_FILE)?, NATIONAL_FILE)?;
        let regions = BoundaryDataset::from_geojson_reader(reader_for(REGIONS_FILE)?, REGIONS_FILE)?;
        let provinces =
            BoundaryDataset::from_geojson_reader(reader_for(PROVINCES_FILE)?, PROVINCES_FILE)?;
        let cities = BoundaryDataset::from_geojson_reader(reader_for(CITIES_FILE)?, CITIES_FILE)?;
        Ok(Self::new(coarse, regions, provinces, cities))
    }
}
