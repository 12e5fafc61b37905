use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while reading a changeset dump.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML near byte {position}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("document ended inside <{element}>")]
    UnexpectedEof { element: String },
    #[error("document has no root element")]
    MissingRoot,
    #[error("changeset {changeset_id}: attribute {attribute}={value:?} is not a number")]
    InvalidNumber {
        changeset_id: String,
        attribute: &'static str,
        value: String,
    },
    #[error("changeset {changeset_id}: attribute {attribute}={value:?} is not an RFC 3339 timestamp")]
    InvalidTimestamp {
        changeset_id: String,
        attribute: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("root element has no usable timestamp attribute")]
    MissingDumpTimestamp,
    #[error("root timestamp {value:?} does not match %Y-%m-%dT%H:%M:%SZ")]
    InvalidDumpTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Errors raised by [`ChangesetParser::ingest`](super::ChangesetParser::ingest).
///
/// Batches flushed before the failure stay committed.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
