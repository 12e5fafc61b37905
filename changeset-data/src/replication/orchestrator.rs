//! Sequential application of replication diffs under the durable lock.
//!
//! A run moves through
//! `Idle → LockAcquired → Validated → Applying(seq)… → Committed → Unlocked`,
//! and may jump to `Unlocked` with failure from any phase after the lock is
//! taken. The in-progress flag is cleared on every exit path once set.

use std::fmt;
use std::io::Cursor;

use changeset_core::{Enricher, SequenceNumber};
use changeset_fs::Compression;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::error::ReplicationError;
use super::source::ReplicationSource;
use crate::parse::{ChangesetParser, DEFAULT_BATCH_SIZE, IngestMode, IngestReport};
use crate::store::{ChangesetStore, ContentionReason, LockAttempt, ReplicationLease};

/// Phases of a replication run, logged at debug level as they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationPhase {
    /// No run has started.
    Idle,
    /// The in-progress flag is held by this run.
    LockAcquired,
    /// The checkpoint and remote state were read and compared.
    Validated,
    /// The diff for this sequence is being fetched and written.
    Applying(SequenceNumber),
    /// Every pending diff was applied and checkpointed.
    Committed,
    /// The flag was cleared; `success` is false when the run failed.
    Unlocked {
        /// Whether the run finished without error.
        success: bool,
    },
}

impl fmt::Display for ReplicationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::LockAcquired => f.write_str("lock acquired"),
            Self::Validated => f.write_str("validated"),
            Self::Applying(sequence) => write!(f, "applying {sequence}"),
            Self::Committed => f.write_str("committed"),
            Self::Unlocked { success: true } => f.write_str("unlocked (success)"),
            Self::Unlocked { success: false } => f.write_str("unlocked (failure)"),
        }
    }
}

/// Non-error results of a replication run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationOutcome {
    /// Diffs `first..=last` were applied in order.
    Applied {
        /// First sequence applied by this run.
        first: SequenceNumber,
        /// Last sequence applied, now the checkpoint.
        last: SequenceNumber,
        /// Totals across every applied diff.
        report: IngestReport,
    },
    /// The remote feed has nothing newer than the checkpoint.
    UpToDate {
        /// The unchanged checkpoint.
        sequence: SequenceNumber,
    },
    /// Another run holds the lock; nothing was changed.
    Contended {
        /// Why the lock could not be taken.
        reason: ContentionReason,
    },
}

/// Drives diffs from a [`ReplicationSource`] into a [`ChangesetStore`].
#[derive(Debug)]
pub struct Replicator<'a, S: ?Sized> {
    store: &'a ChangesetStore,
    enricher: &'a Enricher,
    source: &'a S,
    batch_size: u64,
    phase: ReplicationPhase,
}

impl<'a, S: ReplicationSource + ?Sized> Replicator<'a, S> {
    /// Create a replicator using [`DEFAULT_BATCH_SIZE`].
    #[must_use]
    pub fn new(store: &'a ChangesetStore, enricher: &'a Enricher, source: &'a S) -> Self {
        Self {
            store,
            enricher,
            source,
            batch_size: DEFAULT_BATCH_SIZE,
            phase: ReplicationPhase::Idle,
        }
    }

    /// Override the parser batch size used for each diff.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Most recent phase entered.
    #[must_use]
    pub fn phase(&self) -> ReplicationPhase {
        self.phase
    }

    /// Run one replication cycle.
    ///
    /// # Errors
    /// Returns [`ReplicationError::NotInitialised`] when the checkpoint was
    /// never bootstrapped, and a transport, parse or store error when a
    /// fetch or diff fails. Diffs applied before a failure stay applied and
    /// the checkpoint records the last of them.
    pub fn run(&mut self) -> Result<ReplicationOutcome, ReplicationError> {
        self.enter(ReplicationPhase::Idle);
        let mut lease = match self.store.try_lock_replication()? {
            LockAttempt::Acquired(lease) => lease,
            LockAttempt::Contended(reason) => {
                warn!("replication skipped: lock is held ({reason:?})");
                return Ok(ReplicationOutcome::Contended { reason });
            }
            LockAttempt::NotInitialised => return Err(ReplicationError::NotInitialised),
        };
        self.enter(ReplicationPhase::LockAcquired);
        self.enter(ReplicationPhase::Validated);
        info!("local checkpoint is sequence {}", lease.checkpoint());

        match self.apply(&mut lease) {
            Ok((outcome, last_run)) => {
                lease.release(last_run)?;
                self.enter(ReplicationPhase::Unlocked { success: true });
                Ok(outcome)
            }
            Err(err) => {
                if let Err(release_err) = lease.release(None) {
                    warn!("failed to clear replication in-progress flag: {release_err}");
                }
                self.enter(ReplicationPhase::Unlocked { success: false });
                Err(err)
            }
        }
    }

    fn apply(
        &mut self,
        lease: &mut ReplicationLease<'_>,
    ) -> Result<(ReplicationOutcome, Option<DateTime<Utc>>), ReplicationError> {
        let remote = self.source.fetch_state()?;
        let local = lease.checkpoint();
        info!(
            "remote sequence is {} (last run {})",
            remote.sequence, remote.last_run
        );
        if remote.sequence <= local {
            self.enter(ReplicationPhase::Committed);
            return Ok((ReplicationOutcome::UpToDate { sequence: local }, None));
        }

        let parser = ChangesetParser::new(self.store, self.enricher, IngestMode::Replication)
            .with_batch_size(self.batch_size);
        let mut total = IngestReport::default();
        for sequence in local.range_after(remote.sequence) {
            self.enter(ReplicationPhase::Applying(sequence));
            let url = self.source.url_for(&sequence.diff_path());
            let compressed = self.source.fetch_diff(sequence)?;
            info!("fetched diff {sequence} from {url}");
            let diff = Compression::Gzip.decoder(Cursor::new(compressed));
            let report = parser
                .ingest(diff)
                .map_err(|err| ReplicationError::from_ingest(sequence.get(), err))?;
            lease.advance(sequence)?;
            total = total.combine(report);
        }
        self.enter(ReplicationPhase::Committed);

        let first = local.next().unwrap_or(remote.sequence);
        Ok((
            ReplicationOutcome::Applied {
                first,
                last: remote.sequence,
                report: total,
            },
            Some(remote.last_run),
        ))
    }

    fn enter(&mut self, phase: ReplicationPhase) {
        debug!("replication phase: {} -> {phase}", self.phase);
        self.phase = phase;
    }
}

/// Run one replication cycle with default settings.
///
/// # Errors
/// See [`Replicator::run`].
pub fn replicate<S: ReplicationSource + ?Sized>(
    store: &ChangesetStore,
    enricher: &Enricher,
    source: &S,
) -> Result<ReplicationOutcome, ReplicationError> {
    Replicator::new(store, enricher, source).run()
}
