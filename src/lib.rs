//! Facade crate for the changeset mirror.
//!
//! This crate re-exports the core domain types and exposes the SQLite-backed
//! ingestion and replication engine behind the `store-sqlite` feature.

#![forbid(unsafe_code)]

pub use changeset_core::{
    AdminAttribution, AdminBoundaries, AdminLevel, BoundaryDataset, BoundaryFeature, BoundingBox,
    Changeset, Comment, Enricher, ReplicationState, SequenceNumber, Tags, centroid, in_region,
    locate_admin_unit,
};

#[cfg(feature = "store-sqlite")]
pub use changeset_data::{
    ChangesetParser, ChangesetStore, IngestMode, IngestReport,
    replication::{ReplicationOutcome, SequenceDiscovery, replicate},
};
