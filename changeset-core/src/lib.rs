//! Core domain types for the changeset mirror.
//!
//! These models describe finalised changesets, their discussion comments and
//! the replication checkpoint, together with the pure geospatial functions
//! that attribute each changeset to administrative boundaries. Nothing in this
//! crate performs network or database I/O; GeoJSON decoding of boundary
//! datasets is available behind the `serde` feature.

#![forbid(unsafe_code)]

pub mod boundary;
pub mod changeset;
pub mod enrich;
pub mod replication;

pub use boundary::{AdminBoundaries, BoundaryDataset, BoundaryFeature, RELATION_PREFIX};
#[cfg(feature = "serde")]
pub use boundary::{
    BoundaryError, CITIES_FILE, NATIONAL_FILE, PROVINCES_FILE, REGIONS_FILE,
};
pub use changeset::{AdminAttribution, BoundingBox, Changeset, Comment, Tags};
pub use enrich::{AdminLevel, Enricher, Enrichment, centroid, in_region, locate_admin_unit};
pub use replication::{RemoteState, ReplicationState, SequenceError, SequenceNumber};
