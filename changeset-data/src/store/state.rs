//! Durable replication checkpoint and the in-progress lock built on it.
//!
//! The lock is the `update_in_progress` flag of the singleton state row. It is
//! taken inside an immediate transaction so two processes cannot both observe
//! it clear, and it is committed before any network access. A crashed run
//! leaves the flag set; clearing it is a manual step.
#![forbid(unsafe_code)]

use std::time::Duration;

use changeset_core::{ReplicationState, SequenceNumber};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use rusqlite::{
    Connection, Error as SqliteError, ErrorCode, OptionalExtension, Transaction,
    TransactionBehavior,
};

use super::schema::UNINITIALISED_SEQUENCE;
use super::writer::timestamp;
use super::{BUSY_TIMEOUT, ChangesetStore, StoreError, sqlite_error};

/// Why a replication run could not take the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentionReason {
    /// Another connection holds a write transaction on the state row.
    Busy,
    /// The in-progress flag is already set, either by a live run or by one
    /// that crashed.
    InProgressFlagSet,
}

/// Result of [`ChangesetStore::try_lock_replication`].
#[derive(Debug)]
pub enum LockAttempt<'a> {
    /// The flag is now set and owned by the returned lease.
    Acquired(ReplicationLease<'a>),
    /// Another run holds the lock; nothing was changed.
    Contended(ContentionReason),
    /// The checkpoint has never been bootstrapped; nothing was changed.
    NotInitialised,
}

/// Ownership of the durable replication lock.
///
/// The flag is cleared by [`ReplicationLease::release`] or, failing that,
/// when the lease is dropped.
#[derive(Debug)]
pub struct ReplicationLease<'a> {
    store: &'a ChangesetStore,
    state: ReplicationState,
    checkpoint: SequenceNumber,
    released: bool,
}

impl ReplicationLease<'_> {
    /// State as observed when the lock was taken, with the checkpoint kept
    /// current by [`advance`](Self::advance).
    #[must_use]
    pub fn state(&self) -> &ReplicationState {
        &self.state
    }

    /// Last durably applied sequence.
    #[must_use]
    pub fn checkpoint(&self) -> SequenceNumber {
        self.checkpoint
    }

    /// Durably record `sequence` as applied.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] when the update fails.
    pub fn advance(&mut self, sequence: SequenceNumber) -> Result<(), StoreError> {
        self.store
            .connection
            .execute(
                "UPDATE osm_changeset_state SET last_sequence = ?1 WHERE singleton = 1",
                [i64::from(sequence)],
            )
            .map_err(sqlite_error("advance checkpoint"))?;
        self.checkpoint = sequence;
        self.state.last_sequence = Some(sequence);
        debug!("checkpoint advanced to {sequence}");
        Ok(())
    }

    /// Clear the in-progress flag, recording `last_run` when supplied.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] when the update fails. The flag is then
    /// retried once more when the lease is dropped.
    pub fn release(mut self, last_run: Option<DateTime<Utc>>) -> Result<(), StoreError> {
        clear_flag(&self.store.connection, last_run.as_ref())?;
        self.released = true;
        Ok(())
    }
}

impl Drop for ReplicationLease<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = clear_flag(&self.store.connection, None) {
            warn!(
                "failed to clear replication in-progress flag: {err}; \
                 run `changeset-mirror unlock` before the next replication"
            );
        }
    }
}

fn clear_flag(
    connection: &Connection,
    last_run: Option<&DateTime<Utc>>,
) -> Result<(), StoreError> {
    connection
        .execute(
            "UPDATE osm_changeset_state
                SET update_in_progress = 0,
                    last_timestamp = COALESCE(?1, last_timestamp)
              WHERE singleton = 1",
            [last_run.map(timestamp)],
        )
        .map_err(sqlite_error("release replication lock"))?;
    Ok(())
}

fn is_busy(error: &SqliteError) -> bool {
    matches!(
        error,
        SqliteError::SqliteFailure(failure, _)
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn read_state(connection: &Connection) -> Result<ReplicationState, StoreError> {
    let row: Option<(i64, Option<String>, bool)> = connection
        .query_row(
            "SELECT last_sequence, last_timestamp, update_in_progress
               FROM osm_changeset_state WHERE singleton = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(sqlite_error("read replication state"))?;
    let Some((sequence, stamp, update_in_progress)) = row else {
        return Ok(ReplicationState::default());
    };

    let last_sequence = if sequence == UNINITIALISED_SEQUENCE {
        None
    } else {
        Some(
            SequenceNumber::try_from(sequence).map_err(|_| StoreError::CorruptState {
                column: "last_sequence",
                value: sequence.to_string(),
            })?,
        )
    };
    let last_timestamp = stamp
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|_| StoreError::CorruptState {
                    column: "last_timestamp",
                    value: raw.clone(),
                })
        })
        .transpose()?;

    Ok(ReplicationState {
        last_sequence,
        last_timestamp,
        update_in_progress,
    })
}

impl ChangesetStore {
    /// Current checkpoint.
    ///
    /// # Errors
    /// Returns [`StoreError::CorruptState`] when a stored value is out of
    /// range, or [`StoreError::Sqlite`] when the read fails.
    pub fn replication_state(&self) -> Result<ReplicationState, StoreError> {
        read_state(&self.connection)
    }

    /// Bootstrap or overwrite the checkpoint sequence.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] when the write fails.
    pub fn set_initial_sequence(&self, sequence: SequenceNumber) -> Result<(), StoreError> {
        self.connection
            .execute(
                "INSERT INTO osm_changeset_state (singleton, last_sequence, update_in_progress)
                 VALUES (1, ?1, 0)
                 ON CONFLICT (singleton) DO UPDATE SET last_sequence = excluded.last_sequence",
                [i64::from(sequence)],
            )
            .map_err(sqlite_error("set initial sequence"))?;
        Ok(())
    }

    /// Clear a stuck in-progress flag. Returns whether it was set.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] when the update fails.
    pub fn unlock_replication(&self) -> Result<bool, StoreError> {
        let changed = self
            .connection
            .execute(
                "UPDATE osm_changeset_state SET update_in_progress = 0
                  WHERE singleton = 1 AND update_in_progress = 1",
                [],
            )
            .map_err(sqlite_error("unlock replication"))?;
        Ok(changed > 0)
    }

    /// Try to take the replication lock without waiting.
    ///
    /// # Errors
    /// Returns a [`StoreError`] for failures other than contention.
    pub fn try_lock_replication(&self) -> Result<LockAttempt<'_>, StoreError> {
        self.connection
            .busy_timeout(Duration::ZERO)
            .map_err(sqlite_error("disable busy timeout"))?;
        let attempt = self.claim_lock();
        self.connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(sqlite_error("restore busy timeout"))?;
        attempt
    }

    fn claim_lock(&self) -> Result<LockAttempt<'_>, StoreError> {
        let transaction =
            match Transaction::new_unchecked(&self.connection, TransactionBehavior::Immediate) {
                Ok(transaction) => transaction,
                Err(err) if is_busy(&err) => {
                    warn!("replication state is locked by another connection");
                    return Ok(LockAttempt::Contended(ContentionReason::Busy));
                }
                Err(source) => {
                    return Err(StoreError::Sqlite {
                        operation: "begin lock transaction",
                        source,
                    });
                }
            };

        let state = read_state(&transaction)?;
        if state.update_in_progress {
            warn!(
                "replication in-progress flag is already set; if no other run is active, \
                 a previous run crashed and `changeset-mirror unlock` must be run"
            );
            return Ok(LockAttempt::Contended(ContentionReason::InProgressFlagSet));
        }
        let Some(checkpoint) = state.last_sequence else {
            return Ok(LockAttempt::NotInitialised);
        };

        transaction
            .execute(
                "UPDATE osm_changeset_state SET update_in_progress = 1 WHERE singleton = 1",
                [],
            )
            .map_err(sqlite_error("set in-progress flag"))?;
        match transaction.commit() {
            Ok(()) => {}
            Err(err) if is_busy(&err) => {
                warn!("replication state is locked by another connection");
                return Ok(LockAttempt::Contended(ContentionReason::Busy));
            }
            Err(source) => {
                return Err(StoreError::Sqlite {
                    operation: "commit in-progress flag",
                    source,
                });
            }
        }

        Ok(LockAttempt::Acquired(ReplicationLease {
            store: self,
            state: ReplicationState {
                update_in_progress: true,
                ..state
            },
            checkpoint,
            released: false,
        }))
    }
}
