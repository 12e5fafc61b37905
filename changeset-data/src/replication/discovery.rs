//! Alignment of a fresh checkpoint with the feed's numbering.

use std::io::BufRead;

use changeset_core::SequenceNumber;
use chrono::{DateTime, Utc};
use log::{debug, info};

use super::error::DiscoveryError;
use super::listing::{choose_successor, parse_listing};
use super::source::ReplicationSource;
use crate::parse::read_dump_timestamp;
use crate::store::ChangesetStore;

/// Depth of the feed's directory hierarchy.
const LEVELS: usize = 3;

/// Greedy, level-by-level search for the first sequence published at or
/// after a timestamp.
///
/// At each level the child with the smallest non-negative publication delta
/// is chosen and descended into. Feed timestamps grow with sequence numbers,
/// so the greedy choice is the global one.
#[derive(Debug)]
pub struct SequenceDiscovery<'a, S: ?Sized> {
    source: &'a S,
}

impl<'a, S: ReplicationSource + ?Sized> SequenceDiscovery<'a, S> {
    #[must_use]
    pub const fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Find the sequence whose diff is the first published at or after
    /// `target`.
    ///
    /// # Errors
    /// Returns [`DiscoveryError::NoSuccessor`] when a level has no child
    /// published at or after `target`, or a transport error when a listing
    /// cannot be fetched.
    pub fn discover(&self, target: DateTime<Utc>) -> Result<SequenceNumber, DiscoveryError> {
        let mut path = String::new();
        let mut groups: [String; LEVELS] = Default::default();
        for (level, slot) in groups.iter_mut().enumerate() {
            let html = self.source.fetch_listing(&path)?;
            let entries = parse_listing(&html)?;
            let chosen =
                choose_successor(&entries, target).ok_or_else(|| DiscoveryError::NoSuccessor {
                    level,
                    url: self.source.url_for(&path),
                })?;
            debug!(
                "level {level}: chose {} published {} for target {target}",
                chosen.group, chosen.published
            );
            path.push_str(&chosen.group);
            path.push('/');
            slot.clone_from(&chosen.group);
        }
        Ok(SequenceNumber::from_groups(groups)?)
    }
}

/// Bootstrap the checkpoint from the generation time of a bulk dump.
///
/// Reads only the root element of `dump`, discovers the matching sequence
/// and stores it as the checkpoint.
///
/// # Errors
/// Returns a [`DiscoveryError`] when the dump timestamp is unreadable,
/// discovery fails or the store rejects the update.
pub fn bootstrap_initial_sequence<S, R>(
    store: &ChangesetStore,
    source: &S,
    dump: R,
) -> Result<SequenceNumber, DiscoveryError>
where
    S: ReplicationSource + ?Sized,
    R: BufRead,
{
    let target = read_dump_timestamp(dump)?;
    let sequence = SequenceDiscovery::new(source).discover(target)?;
    store.set_initial_sequence(sequence)?;
    info!("initial replication sequence set to {sequence} for dump generated at {target}");
    Ok(sequence)
}
