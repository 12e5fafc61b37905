//! Incremental catch-up from the changeset replication feed.
//!
//! [`replicate`] takes the durable lock, fetches every diff newer than the
//! checkpoint in order and applies each through the replacing parser,
//! advancing the checkpoint after every diff. [`SequenceDiscovery`] aligns a
//! fresh checkpoint with the feed using the generation time of a bulk dump.
//!
//! # Example
//!
//! ```no_run
//! use camino::Utf8Path;
//! use changeset_core::{AdminBoundaries, Enricher};
//! use changeset_data::ChangesetStore;
//! use changeset_data::replication::{HttpReplicationSource, ReplicationOutcome, replicate};
//!
//! # fn run(boundaries: AdminBoundaries) -> Result<(), Box<dyn std::error::Error>> {
//! let store = ChangesetStore::open(Utf8Path::new("changesets.db"))?;
//! let enricher = Enricher::new(boundaries);
//! let source = HttpReplicationSource::new("https://planet.openstreetmap.org/replication/changesets/")?;
//! match replicate(&store, &enricher, &source)? {
//!     ReplicationOutcome::Applied { last, .. } => println!("caught up to {last}"),
//!     other => println!("{other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

mod discovery;
mod error;
mod listing;
mod orchestrator;
mod source;

#[doc(hidden)]
pub mod test_support;

pub use discovery::{SequenceDiscovery, bootstrap_initial_sequence};
pub use error::{DiscoveryError, ReplicationError, TransportError};
pub use listing::{ListingEntry, choose_successor, parse_listing};
pub use orchestrator::{ReplicationOutcome, ReplicationPhase, Replicator, replicate};
pub use source::{
    DEFAULT_REPLICATION_URL, DEFAULT_USER_AGENT, HttpReplicationSource,
    HttpReplicationSourceConfig, ReplicationSource, STATE_PATH, parse_remote_state,
};

#[cfg(test)]
mod tests;
