//! Test utilities for replication.
//!
//! This module provides [`StubReplicationSource`], an in-memory
//! [`ReplicationSource`] serving a fixed state descriptor, gzip-compressed
//! diffs and directory listings, with injectable failures.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, Write};

use changeset_core::{RemoteState, SequenceNumber};
use chrono::{DateTime, Utc};
use flate2::Compression as GzLevel;
use flate2::write::GzEncoder;

use super::error::TransportError;
use super::source::ReplicationSource;

const STUB_BASE_URL: &str = "https://replication.example.org/changesets/";

/// Stub [`ReplicationSource`] for tests.
///
/// # Example
///
/// ```
/// use changeset_core::SequenceNumber;
/// use changeset_data::replication::ReplicationSource;
/// use changeset_data::replication::test_support::StubReplicationSource;
/// use chrono::{TimeZone, Utc};
///
/// let seven = SequenceNumber::try_from(7_i64)?;
/// let source = StubReplicationSource::with_state(seven, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
///     .with_diff(seven, "<osmChange/>");
/// assert_eq!(source.fetch_state()?.sequence, seven);
/// assert!(!source.fetch_diff(seven)?.is_empty());
/// assert_eq!(source.fetched(), vec![seven]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct StubReplicationSource {
    state: Option<RemoteState>,
    diffs: BTreeMap<SequenceNumber, Vec<u8>>,
    failing: Vec<SequenceNumber>,
    listings: BTreeMap<String, String>,
    fetched: RefCell<Vec<SequenceNumber>>,
}

impl StubReplicationSource {
    /// Create a source whose descriptor reports `sequence` and `last_run`.
    #[must_use]
    pub fn with_state(sequence: SequenceNumber, last_run: DateTime<Utc>) -> Self {
        Self {
            state: Some(RemoteState { sequence, last_run }),
            ..Self::default()
        }
    }

    /// Create a source whose descriptor cannot be fetched.
    #[must_use]
    pub fn with_state_error() -> Self {
        Self::default()
    }

    /// Serve `xml`, gzip-compressed, as the diff for `sequence`.
    #[must_use]
    pub fn with_diff(mut self, sequence: SequenceNumber, xml: &str) -> Self {
        self.diffs.insert(sequence, gzip(xml.as_bytes()));
        self
    }

    /// Fail the request for `sequence` with a 500.
    #[must_use]
    pub fn with_failing_diff(mut self, sequence: SequenceNumber) -> Self {
        self.failing.push(sequence);
        self
    }

    /// Serve `html` as the directory index at `path`.
    #[must_use]
    pub fn with_listing(mut self, path: &str, html: &str) -> Self {
        self.listings.insert(path.to_owned(), html.to_owned());
        self
    }

    /// Sequences requested so far, in request order.
    #[must_use]
    pub fn fetched(&self) -> Vec<SequenceNumber> {
        self.fetched.borrow().clone()
    }

    fn not_found(&self, path: &str) -> TransportError {
        TransportError::Http {
            url: self.url_for(path),
            status: 404,
            message: "not found".to_owned(),
        }
    }
}

/// Gzip-compress `bytes` in memory.
#[must_use]
pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), GzLevel::fast());
    encoder
        .write_all(bytes)
        .and_then(|()| encoder.finish())
        .unwrap_or_default()
}

impl ReplicationSource for StubReplicationSource {
    fn base_url(&self) -> &str {
        STUB_BASE_URL
    }

    fn fetch_state(&self) -> Result<RemoteState, TransportError> {
        self.state.ok_or_else(|| TransportError::Network {
            url: self.url_for(super::source::STATE_PATH),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
        })
    }

    fn fetch_diff(&self, sequence: SequenceNumber) -> Result<Vec<u8>, TransportError> {
        self.fetched.borrow_mut().push(sequence);
        let path = sequence.diff_path();
        if self.failing.contains(&sequence) {
            return Err(TransportError::Http {
                url: self.url_for(&path),
                status: 500,
                message: "internal server error".to_owned(),
            });
        }
        self.diffs
            .get(&sequence)
            .cloned()
            .ok_or_else(|| self.not_found(&path))
    }

    fn fetch_listing(&self, path: &str) -> Result<String, TransportError> {
        self.listings
            .get(path)
            .cloned()
            .ok_or_else(|| self.not_found(path))
    }
}
