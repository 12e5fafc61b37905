//! Error types produced by replication and sequence discovery.

use std::io;

use changeset_core::SequenceError;
use thiserror::Error;

use crate::parse::{IngestError, ParseError};
use crate::store::StoreError;

/// Transport-level errors encountered while talking to the replication feed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The server returned an HTTP error status.
    #[error("request to {url} failed with status {status}: {message}")]
    Http {
        /// Fully qualified request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Short error description supplied by the server.
        message: String,
    },
    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Fully qualified request URL.
        url: String,
        /// Timeout that elapsed, in seconds.
        timeout_secs: u64,
    },
    /// The request failed due to an I/O error.
    #[error("network error contacting {url}: {source}")]
    Network {
        /// Fully qualified request URL.
        url: String,
        /// I/O error reported by the transport.
        source: io::Error,
    },
    /// A feed-relative path could not be joined onto the base URL.
    #[error("cannot resolve {path:?} against {base}")]
    InvalidUrl {
        /// Configured base URL.
        base: String,
        /// Feed-relative path that failed to resolve.
        path: String,
        /// Parser error from `url`.
        #[source]
        source: url::ParseError,
    },
    /// The state descriptor was not valid YAML or lacked required keys.
    #[error("state descriptor at {url} is malformed: {message}")]
    InvalidState {
        /// URL of the state descriptor.
        url: String,
        /// Decoder error description.
        message: String,
    },
    /// The blocking runtime used for HTTP could not be created.
    #[error("failed to build HTTP runtime: {source}")]
    Runtime {
        /// Error from the runtime builder.
        source: io::Error,
    },
    /// The HTTP client could not be created.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// Error from the client builder.
        source: reqwest::Error,
    },
}

/// Errors that abort a replication run.
///
/// Lock contention and an up-to-date checkpoint are not errors; see
/// [`ReplicationOutcome`](super::ReplicationOutcome).
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// The checkpoint still holds the uninitialised sentinel.
    #[error("replication checkpoint is not initialised; run set-initial-sequence or load first")]
    NotInitialised,
    /// The state descriptor or a diff could not be fetched.
    #[error("failed to fetch from the replication feed")]
    Transport(#[from] TransportError),
    /// A fetched diff was not valid changeset XML.
    #[error("failed to parse diff for sequence {sequence}")]
    Parse {
        /// Sequence of the rejected diff.
        sequence: u32,
        /// Underlying parse failure.
        #[source]
        source: ParseError,
    },
    /// Writing changesets or the checkpoint failed.
    #[error("store operation failed during replication")]
    Store(#[from] StoreError),
    /// The remote sequence is outside the nine-digit range.
    #[error("remote sequence is invalid")]
    Sequence(#[from] SequenceError),
}

impl ReplicationError {
    pub(crate) fn from_ingest(sequence: u32, error: IngestError) -> Self {
        match error {
            IngestError::Parse(source) => Self::Parse { sequence, source },
            IngestError::Store(source) => Self::Store(source),
        }
    }
}

/// Errors raised while aligning the checkpoint with the feed.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A directory listing could not be fetched.
    #[error("failed to fetch a replication listing")]
    Transport(#[from] TransportError),
    /// The listing scraper's pattern was rejected.
    #[error("listing pattern failed to compile")]
    Listing(#[from] regex::Error),
    /// Every entry at a level predates the target.
    #[error("no entry at level {level} of {url} was published at or after the target")]
    NoSuccessor {
        /// Zero-based directory depth.
        level: usize,
        /// URL of the listing that had no candidate.
        url: String,
    },
    /// The chosen groups do not form a valid sequence number.
    #[error("discovered directory groups do not form a sequence")]
    Sequence(#[from] SequenceError),
    /// Storing the discovered checkpoint failed.
    #[error("failed to store the discovered sequence")]
    Store(#[from] StoreError),
    /// The dump's root timestamp was missing or malformed.
    #[error("failed to read the dump timestamp")]
    DumpTimestamp(#[from] ParseError),
}
