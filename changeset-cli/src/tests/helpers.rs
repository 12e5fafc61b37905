//! Test helpers for building on-disk workspaces and stub feeds.

use crate::load::LoadConfig;
use crate::replicate::ReplicateConfig;
use crate::setup::{FeedSettings, SchemaActions};
use camino::{Utf8Path, Utf8PathBuf};
use changeset_core::{CITIES_FILE, NATIONAL_FILE, PROVINCES_FILE, REGIONS_FILE, SequenceNumber};
use changeset_data::ChangesetStore;
use changeset_data::replication::test_support::StubReplicationSource;
use changeset_data::test_support::{ChangesetXml, dump_xml};
use chrono::{DateTime, TimeZone, Utc};
use std::fmt::Write as _;
use std::fs;
use tempfile::TempDir;

/// Sequence the stub listings resolve the sample dump timestamp to.
pub(super) const DISCOVERED_SEQUENCE: i64 = 5_912_345;

pub(super) fn seq(value: i64) -> SequenceNumber {
    SequenceNumber::try_from(value).expect("valid sequence")
}

pub(super) fn last_run() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    fs::write(path.as_std_path(), contents).expect("write test file");
}

fn feature_collection(features: &[(&str, &str, [f64; 4])]) -> String {
    let mut json = String::from(r#"{"type":"FeatureCollection","features":["#);
    for (index, (name, id, [min_lon, max_lon, min_lat, max_lat])) in features.iter().enumerate() {
        if index > 0 {
            json.push(',');
        }
        write!(
            json,
            r#"{{"type":"Feature","properties":{{"name":"{name}","@id":"{id}"}},"geometry":{{"type":"Polygon","coordinates":[[[{min_lon},{min_lat}],[{max_lon},{min_lat}],[{max_lon},{max_lat}],[{min_lon},{max_lat}],[{min_lon},{min_lat}]]]}}}}"#
        )
        .expect("format feature");
    }
    json.push_str("]}");
    json
}

/// Temporary directory holding boundaries, a dump and a database path.
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        let boundaries = root.join("GeoJSON");
        fs::create_dir(boundaries.as_std_path()).expect("create boundaries dir");
        let files = [
            (
                NATIONAL_FILE,
                feature_collection(&[("Philippines", "relation/443174", [116.0, 127.0, 4.0, 21.0])]),
            ),
            (
                REGIONS_FILE,
                feature_collection(&[("Luzon", "relation/100", [119.0, 123.0, 12.0, 19.0])]),
            ),
            (
                PROVINCES_FILE,
                feature_collection(&[("Metro", "relation/200", [120.8, 121.2, 14.3, 14.9])]),
            ),
            (
                CITIES_FILE,
                feature_collection(&[("Manila", "relation/300", [120.9, 121.05, 14.5, 14.65])]),
            ),
        ];
        for (name, contents) in files {
            write_utf8(&boundaries.join(name), contents.as_bytes());
        }
        let dump = dump_xml(&[
            ChangesetXml::closed(1).with_comment(7, Some("welcome")),
            ChangesetXml::open(2),
            ChangesetXml::closed(3).outside(),
            ChangesetXml::closed(4),
        ]);
        write_utf8(&root.join("changesets.osm"), dump.as_bytes());
        Self { _dir: dir, root }
    }

    pub(super) fn database(&self) -> Utf8PathBuf {
        self.root.join("changesets.db")
    }

    pub(super) fn dump(&self) -> Utf8PathBuf {
        self.root.join("changesets.osm")
    }

    pub(super) fn boundaries(&self) -> Utf8PathBuf {
        self.root.join("GeoJSON")
    }

    pub(super) fn load_config(&self, bootstrap: bool) -> LoadConfig {
        LoadConfig {
            database: self.database(),
            file: self.dump(),
            boundaries_dir: self.boundaries(),
            schema: SchemaActions {
                create: true,
                ..SchemaActions::default()
            },
            batch_size: 2,
            feed: bootstrap.then(|| FeedSettings::new(None, None)),
        }
    }

    pub(super) fn replicate_config(&self) -> ReplicateConfig {
        ReplicateConfig {
            database: self.database(),
            boundaries_dir: self.boundaries(),
            geometry: false,
            batch_size: 2,
            feed: FeedSettings::new(None, None),
        }
    }

    pub(super) fn store(&self) -> ChangesetStore {
        ChangesetStore::open(&self.database()).expect("open workspace database")
    }

    pub(super) fn stored_ids(&self) -> Vec<i64> {
        let store = self.store();
        let mut statement = store
            .connection()
            .prepare("SELECT id FROM osm_changeset ORDER BY id")
            .expect("prepare id query");
        statement
            .query_map([], |row| row.get(0))
            .expect("query ids")
            .collect::<Result<_, _>>()
            .expect("read ids")
    }
}

fn directory(entries: &[(&str, &str)]) -> String {
    entries
        .iter()
        .map(|(group, stamp)| format!("<a href=\"{group}/\">{group}/</a>    {stamp}    -\n"))
        .collect()
}

/// Feed whose listings lead from the sample dump timestamp to
/// [`DISCOVERED_SEQUENCE`], with `sequence` as the remote head.
pub(super) fn listed_feed(sequence: i64) -> StubReplicationSource {
    StubReplicationSource::with_state(seq(sequence), last_run())
        .with_listing(
            "",
            &directory(&[("004", "2024-02-20 00:00"), ("005", "2024-03-10 00:00")]),
        )
        .with_listing(
            "005/",
            &directory(&[("911", "2024-02-28 00:00"), ("912", "2024-03-02 00:00")]),
        )
        .with_listing(
            "005/912/",
            "<a href=\"344.osm.gz\">344.osm.gz</a>  2024-03-01 00:00  1K\n\
             <a href=\"345.osm.gz\">345.osm.gz</a>  2024-03-01 00:02  1K\n",
        )
}
