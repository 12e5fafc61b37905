//! Ingestion, storage and replication for the changeset mirror.
//!
//! Responsibilities:
//! - Stream changeset XML from bulk dumps and replication diffs.
//! - Persist enriched changesets and comments in SQLite, with the
//!   replication checkpoint and its durable lock.
//! - Fetch diffs from the replication feed and align fresh checkpoints with
//!   a dump's generation time.
//!
//! Boundaries:
//! - Do not encode domain rules (live in `changeset-core`).
//! - Blocking HTTP runs on a private runtime; nothing here is async.
//!
//! Invariants:
//! - Only closed changesets inside the coarse boundary are stored.
//! - The checkpoint only advances after a diff's writes have committed.
//! - No global mutable state.

use camino::Utf8Path;
use changeset_core::{AdminBoundaries, BoundaryError};

pub mod parse;
pub mod replication;
pub mod store;

#[doc(hidden)]
pub mod test_support;

pub use parse::{ChangesetParser, IngestError, IngestMode, IngestReport, ParseError};
pub use replication::{
    DiscoveryError, HttpReplicationSource, ReplicationError, ReplicationOutcome,
    ReplicationSource, SequenceDiscovery, TransportError, bootstrap_initial_sequence, replicate,
};
pub use store::{ChangesetStore, SchemaError, StoreError};

/// Load the four boundary datasets from `dir`.
///
/// # Errors
/// Returns [`BoundaryError::Open`] when the directory or one of its files
/// cannot be opened, and a decoding error for malformed GeoJSON.
pub fn load_boundaries(dir: &Utf8Path) -> Result<AdminBoundaries, BoundaryError> {
    let root = changeset_fs::open_utf8_dir(dir).map_err(|source| BoundaryError::Open {
        file: dir.to_string(),
        source,
    })?;
    AdminBoundaries::load_with(|name| root.open(name))
}
