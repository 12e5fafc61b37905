//! Bounded-memory parsing of changeset dumps and diffs.
//!
//! [`ChangesetReader`] walks the XML one top-level element at a time.
//! [`ChangesetParser`] applies the acceptance filter, enriches each record
//! and flushes fixed-size batches to a [`ChangesetStore`](crate::ChangesetStore).

mod error;
mod ingest;
mod reader;
mod record;

pub use error::{IngestError, ParseError};
pub use ingest::{
    ChangesetParser, DEFAULT_BATCH_SIZE, IngestMode, IngestReport, read_dump_timestamp,
};
pub use reader::{ChangesetReader, RawComment, RawElement};
pub use record::{REQUIRED_ATTRIBUTES, bounding_box, into_records, is_accepted};
