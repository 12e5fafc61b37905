//! Batching driver that runs parsed elements through enrichment into the store.

use std::io::BufRead;
use std::time::Instant;

use changeset_core::Enricher;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info};

use super::error::{IngestError, ParseError};
use super::reader::ChangesetReader;
use super::record::{bounding_box, into_records, is_accepted};
use crate::store::{ChangesetBatch, ChangesetStore};

/// Records buffered before each flush to the store.
pub const DEFAULT_BATCH_SIZE: u64 = 10_000;

const DUMP_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// How parsed records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Insert only; the store is assumed not to hold the ids yet.
    #[default]
    Bulk,
    /// Delete any stored row for an id before inserting it again.
    Replication,
}

/// Counters describing one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Elements that passed the acceptance filter.
    pub considered: u64,
    /// Accepted elements whose centroid passed the membership test.
    pub retained: u64,
    /// Batches committed to the store.
    pub batches: u64,
}

impl IngestReport {
    /// Sum the counters of two runs.
    #[must_use]
    pub fn combine(mut self, other: Self) -> Self {
        self.considered += other.considered;
        self.retained += other.retained;
        self.batches += other.batches;
        self
    }
}

/// Streams a dump through the enricher and writes it in fixed-size batches.
///
/// Each batch is one transaction. A failure part-way through leaves every
/// previously flushed batch committed.
#[derive(Debug)]
pub struct ChangesetParser<'a> {
    store: &'a ChangesetStore,
    enricher: &'a Enricher,
    mode: IngestMode,
    batch_size: u64,
}

impl<'a> ChangesetParser<'a> {
    /// Create a parser writing to `store`.
    #[must_use]
    pub fn new(store: &'a ChangesetStore, enricher: &'a Enricher, mode: IngestMode) -> Self {
        Self {
            store,
            enricher,
            mode,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the number of retained records per batch. Zero is treated
    /// as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Write mode in use.
    #[must_use]
    pub fn mode(&self) -> IngestMode {
        self.mode
    }

    /// Parse `source` to exhaustion, flushing every `batch_size` retained
    /// records and once more at the end.
    ///
    /// # Errors
    /// Returns [`IngestError::Parse`] for malformed XML or attributes and
    /// [`IngestError::Store`] when a batch cannot be committed.
    pub fn ingest<R: BufRead>(&self, source: R) -> Result<IngestReport, IngestError> {
        let started = Instant::now();
        let replace = self.mode == IngestMode::Replication;
        let mut report = IngestReport::default();
        let mut batch = ChangesetBatch::default();

        for element in ChangesetReader::new(source) {
            let element = element?;
            if !is_accepted(&element) {
                continue;
            }
            report.considered += 1;
            let bbox = bounding_box(&element)?;
            let Some(enrichment) = self.enricher.enrich(&bbox) else {
                continue;
            };
            report.retained += 1;
            let (changeset, comments) = into_records(element, bbox, enrichment)?;
            batch.push(changeset, comments, replace);

            if report.retained % self.batch_size == 0 {
                self.flush(&mut batch, &mut report, started)?;
            }
        }

        if !batch.is_empty() {
            self.flush(&mut batch, &mut report, started)?;
        }
        info!(
            "parsed {} changesets, retained {} in {} batches ({:?})",
            report.considered,
            report.retained,
            report.batches,
            started.elapsed()
        );
        Ok(report)
    }

    fn flush(
        &self,
        batch: &mut ChangesetBatch,
        report: &mut IngestReport,
        started: Instant,
    ) -> Result<(), IngestError> {
        self.store.write_batch(batch)?;
        batch.clear();
        report.batches += 1;
        info!(
            "retained {} of {} changesets ({:.0}/s)",
            report.retained,
            report.considered,
            rate(report.considered, started)
        );
        Ok(())
    }
}

fn rate(count: u64, started: Instant) -> f64 {
    count as f64 / started.elapsed().as_secs_f64().max(f64::EPSILON)
}

/// Read the generation timestamp from the root element of a dump.
///
/// Only the prolog and root start tag are read; the caller may drop the
/// source afterwards.
///
/// # Errors
/// Returns [`ParseError::MissingDumpTimestamp`] when the root lacks a
/// `timestamp` attribute and [`ParseError::InvalidDumpTimestamp`] when it is
/// not in `%Y-%m-%dT%H:%M:%SZ` form.
///
/// # Examples
/// ```
/// use changeset_data::parse::read_dump_timestamp;
///
/// let xml = r#"<osm version="0.6" timestamp="2024-03-01T00:00:02Z"></osm>"#;
/// let stamp = read_dump_timestamp(xml.as_bytes())?;
/// assert_eq!(stamp.to_rfc3339(), "2024-03-01T00:00:02+00:00");
/// # Ok::<(), changeset_data::parse::ParseError>(())
/// ```
pub fn read_dump_timestamp<R: BufRead>(source: R) -> Result<DateTime<Utc>, ParseError> {
    let mut reader = ChangesetReader::new(source);
    let value = reader
        .root_attribute("timestamp")?
        .ok_or(ParseError::MissingDumpTimestamp)?;
    let parsed = NaiveDateTime::parse_from_str(value, DUMP_TIMESTAMP_FORMAT).map_err(|source| {
        ParseError::InvalidDumpTimestamp {
            value: value.to_owned(),
            source,
        }
    })?;
    debug!("dump generated at {parsed}");
    Ok(parsed.and_utc())
}
