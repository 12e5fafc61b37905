use std::io;

use geo::{Contains, Point};
use rstest::rstest;

use super::*;

const REGIONS: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": {"@id": "relation/1", "name": "North"},
      "geometry": {"type": "Polygon", "coordinates": [[[0, 5], [10, 5], [10, 10], [0, 10], [0, 5]]]}
    },
    {
      "type": "Feature",
      "properties": {"@id": "relation/2"},
      "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [10, 0], [10, 5], [0, 5], [0, 0]]]}
    },
    {
      "type": "Feature",
      "properties": {"name": "No identifier"},
      "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]]}
    },
    {
      "type": "Feature",
      "properties": {"@id": "relation/3", "name": "Line"},
      "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}
    },
    {
      "type": "Feature",
      "properties": {"@id": "way/4", "name": "Islands"},
      "geometry": {
        "type": "MultiPolygon",
        "coordinates": [
          [[[20, 20], [21, 20], [21, 21], [20, 21], [20, 20]]],
          [[[30, 30], [31, 30], [31, 31], [30, 31], [30, 30]]]
        ]
      }
    }
  ]
}"#;

const NATIONAL: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": {"@id": "relation/100", "name": "Country"},
      "geometry": {"type": "Polygon", "coordinates": [[[-1, -1], [40, -1], [40, 40], [-1, 40], [-1, -1]]]}
    },
    {
      "type": "Feature",
      "properties": {"@id": "relation/101", "name": "Ignored"},
      "geometry": {"type": "Polygon", "coordinates": [[[100, 100], [101, 100], [101, 101], [100, 100]]]}
    }
  ]
}"#;

#[rstest]
fn decodes_supported_features_in_order() {
    let dataset = BoundaryDataset::from_geojson_reader(REGIONS.as_bytes(), "regions")
        .expect("regions should decode");
    let ids: Vec<_> = dataset
        .features()
        .iter()
        .map(BoundaryFeature::identifier)
        .collect();
    assert_eq!(ids, vec!["1", "2", "way/4"]);
}

#[rstest]
fn keeps_unnamed_features_for_ordering() {
    let dataset = BoundaryDataset::from_geojson_reader(REGIONS.as_bytes(), "regions")
        .expect("regions should decode");
    let unnamed = dataset
        .features()
        .get(1)
        .expect("second feature should be present");
    assert!(unnamed.name.is_none());
}

#[rstest]
fn multipolygons_keep_every_member() {
    let dataset = BoundaryDataset::from_geojson_reader(REGIONS.as_bytes(), "regions")
        .expect("regions should decode");
    let islands = dataset
        .features()
        .last()
        .expect("islands feature should be present");
    assert!(islands.geometry.contains(&Point::new(20.5, 20.5)));
    assert!(islands.geometry.contains(&Point::new(30.5, 30.5)));
}

#[rstest]
fn rejects_invalid_json() {
    let err = BoundaryDataset::from_geojson_reader("{".as_bytes(), "broken.geojson")
        .expect_err("truncated JSON should fail");
    assert!(matches!(err, BoundaryError::Decode { ref file, .. } if file == "broken.geojson"));
}

fn open_fixture(file: &str) -> io::Result<&'static [u8]> {
    match file {
        NATIONAL_FILE => Ok(NATIONAL.as_bytes()),
        REGIONS_FILE | PROVINCES_FILE | CITIES_FILE => Ok(REGIONS.as_bytes()),
        other => Err(io::Error::new(io::ErrorKind::NotFound, other.to_owned())),
    }
}

#[rstest]
fn load_with_uses_first_national_feature() {
    let boundaries = AdminBoundaries::load_with(open_fixture).expect("boundaries should load");
    assert!(boundaries.coarse.contains(&Point::new(5.0, 5.0)));
    assert!(!boundaries.coarse.contains(&Point::new(100.5, 100.2)));
    assert_eq!(boundaries.cities.len(), 3);
}

#[rstest]
fn load_with_reports_missing_file() {
    let err = AdminBoundaries::load_with(|file| {
        if file == CITIES_FILE {
            Err(io::Error::new(io::ErrorKind::NotFound, "absent"))
        } else {
            open_fixture(file)
        }
    })
    .expect_err("missing cities file should fail");
    assert!(matches!(err, BoundaryError::Open { ref file, .. } if file == CITIES_FILE));
}

#[rstest]
fn empty_national_file_is_rejected() {
    let err = AdminBoundaries::load_with(|file| {
        if file == NATIONAL_FILE {
            Ok(r#"{"type":"FeatureCollection","features":[]}"#.as_bytes())
        } else {
            open_fixture(file)
        }
    })
    .expect_err("empty national file should fail");
    assert!(matches!(err, BoundaryError::MissingCoarse { .. }));
}
