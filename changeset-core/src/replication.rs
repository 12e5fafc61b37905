//! Replication feed numbering and the durable checkpoint model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Number of decimal digits in a zero-padded sequence number.
pub const SEQUENCE_DIGITS: usize = 9;

/// Errors raised when constructing a [`SequenceNumber`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("sequence number {value} is outside 0..={max}", max = SequenceNumber::MAX)]
    OutOfRange { value: i64 },
    #[error("'{input}' is not a decimal sequence number")]
    Malformed { input: String },
    #[error("directory group '{group}' must be exactly three digits")]
    InvalidGroup { group: String },
}

/// Position of a diff file in the replication feed.
///
/// Values fit in nine decimal digits so they map onto the three-level
/// directory layout of the feed.
///
/// # Examples
/// ```
/// use changeset_core::SequenceNumber;
///
/// let sequence = SequenceNumber::try_from(5_123_456_i64)?;
/// assert_eq!(sequence.diff_path(), "005/123/456.osm.gz");
/// assert_eq!(sequence.to_string(), "5123456");
/// # Ok::<(), changeset_core::SequenceError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(u32);

impl SequenceNumber {
    /// Largest sequence representable by the directory layout.
    pub const MAX: u32 = 999_999_999;

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The next sequence, or `None` at the end of the numbering space.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        if self.0 >= Self::MAX {
            None
        } else {
            Some(Self(self.0 + 1))
        }
    }

    /// Zero-padded nine-digit form.
    #[must_use]
    pub fn padded(self) -> String {
        format!("{:0width$}", self.0, width = SEQUENCE_DIGITS)
    }

    /// The three directory groups of the padded form.
    #[must_use]
    pub fn groups(self) -> [String; 3] {
        let padded = self.padded();
        let (top, rest) = padded.split_at(3);
        let (middle, leaf) = rest.split_at(3);
        [top.to_owned(), middle.to_owned(), leaf.to_owned()]
    }

    /// Feed-relative location of the diff file for this sequence.
    #[must_use]
    pub fn diff_path(self) -> String {
        let [top, middle, leaf] = self.groups();
        format!("{top}/{middle}/{leaf}.osm.gz")
    }

    /// Rebuild a sequence from the three directory groups chosen during
    /// discovery.
    ///
    /// # Errors
    /// Returns [`SequenceError::InvalidGroup`] when a group is not exactly
    /// three ASCII digits.
    ///
    /// # Examples
    /// ```
    /// use changeset_core::SequenceNumber;
    ///
    /// let sequence = SequenceNumber::from_groups(["004", "870", "012"])?;
    /// assert_eq!(sequence.get(), 4_870_012);
    /// # Ok::<(), changeset_core::SequenceError>(())
    /// ```
    pub fn from_groups<S: AsRef<str>>(groups: [S; 3]) -> Result<Self, SequenceError> {
        let mut joined = String::with_capacity(SEQUENCE_DIGITS);
        for raw in &groups {
            let group = raw.as_ref();
            if group.len() != 3 || !group.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(SequenceError::InvalidGroup {
                    group: group.to_owned(),
                });
            }
            joined.push_str(group);
        }
        let trimmed = joined.trim_start_matches('0');
        if trimmed.is_empty() {
            return Ok(Self(0));
        }
        trimmed.parse()
    }

    /// Sequences strictly after `self` up to and including `last`, in order.
    pub fn range_after(self, last: Self) -> impl Iterator<Item = Self> {
        (self.0..last.0).map(|value| Self(value + 1))
    }
}

impl TryFrom<i64> for SequenceNumber {
    type Error = SequenceError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .ok()
            .filter(|raw| *raw <= Self::MAX)
            .map(Self)
            .ok_or(SequenceError::OutOfRange { value })
    }
}

impl TryFrom<u64> for SequenceNumber {
    type Error = SequenceError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let signed = i64::try_from(value).unwrap_or(i64::MAX);
        Self::try_from(signed)
    }
}

impl From<SequenceNumber> for i64 {
    fn from(value: SequenceNumber) -> Self {
        Self::from(value.0)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SequenceNumber {
    type Err = SequenceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let value: i64 = input.trim().parse().map_err(|_| SequenceError::Malformed {
            input: input.to_owned(),
        })?;
        Self::try_from(value)
    }
}

/// Durable checkpoint for the replication feed.
///
/// `last_sequence` is `None` until the checkpoint has been bootstrapped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationState {
    /// Last fully applied sequence.
    pub last_sequence: Option<SequenceNumber>,
    /// Remote `last_run` recorded after the last successful run.
    pub last_timestamp: Option<DateTime<Utc>>,
    /// Durable lock flag; set while a run is applying diffs.
    pub update_in_progress: bool,
}

impl ReplicationState {
    /// Whether the checkpoint has been bootstrapped.
    #[must_use]
    pub const fn is_initialised(&self) -> bool {
        self.last_sequence.is_some()
    }
}

/// Snapshot of the remote feed's state descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteState {
    /// Newest published sequence.
    pub sequence: SequenceNumber,
    /// When the feed was last generated.
    pub last_run: DateTime<Utc>,
}
