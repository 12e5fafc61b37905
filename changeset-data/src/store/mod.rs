//! SQLite persistence for changesets, comments and the replication checkpoint.
//!
//! The module is split into focused submodules:
//! - [`schema`] materialises and truncates the tables.
//! - [`writer`] performs batched, transactional inserts and replacements.
//! - [`state`] owns the durable replication lock and checkpoint.
#![forbid(unsafe_code)]

mod schema;
mod state;
mod writer;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, Error as SqliteError};
use thiserror::Error;

pub use schema::{SCHEMA_VERSION, SchemaError, initialise_schema, truncate};
pub use state::{ContentionReason, LockAttempt, ReplicationLease};
pub use writer::{ChangesetBatch, GEOMETRY_SRID, ewkt_rectangle};

/// How long ordinary statements wait on a locked database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open SQLite database at {path}")]
    Open {
        path: Utf8PathBuf,
        #[source]
        source: SqliteError,
    },
    #[error("SQLite operation '{operation}' failed")]
    Sqlite {
        operation: &'static str,
        #[source]
        source: SqliteError,
    },
    #[error("failed to encode tags for changeset {changeset_id}")]
    EncodeTags {
        changeset_id: i64,
        #[source]
        source: serde_json::Error,
    },
    #[error("replication state column {column} holds invalid value {value:?}")]
    CorruptState { column: &'static str, value: String },
}

pub(crate) fn sqlite_error(operation: &'static str) -> impl FnOnce(SqliteError) -> StoreError {
    move |source| StoreError::Sqlite { operation, source }
}

/// Relational store for mirrored changesets.
///
/// Writes go through short transactions on a single connection. The
/// `geometry` flag controls whether inserts also populate the `geom` column.
#[derive(Debug)]
pub struct ChangesetStore {
    connection: Connection,
    geometry: bool,
}

impl ChangesetStore {
    /// Open or create the database at `path`.
    ///
    /// # Errors
    /// Returns [`StoreError::Open`] when SQLite cannot open the file, or
    /// [`StoreError::Sqlite`] when connection pragmas fail.
    pub fn open(path: &Utf8Path) -> Result<Self, StoreError> {
        let connection = Connection::open(path.as_std_path()).map_err(|source| {
            StoreError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::from_connection(connection)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] when SQLite cannot allocate the
    /// database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(sqlite_error("open in-memory"))?;
        Self::from_connection(connection)
    }

    /// Wrap an existing connection, enabling foreign keys.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] when connection pragmas fail.
    pub fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        connection
            .pragma_update(None, "foreign_keys", true)
            .map_err(sqlite_error("enable foreign keys"))?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(sqlite_error("set busy timeout"))?;
        Ok(Self {
            connection,
            geometry: false,
        })
    }

    /// Enable or disable writing the bounding rectangle geometry.
    #[must_use]
    pub fn with_geometry(mut self, geometry: bool) -> Self {
        self.geometry = geometry;
        self
    }

    /// Whether inserts populate the `geom` column.
    #[must_use]
    pub fn geometry_enabled(&self) -> bool {
        self.geometry
    }

    /// Underlying SQLite connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Create the schema, adding the geometry column when enabled.
    ///
    /// # Errors
    /// Returns a [`SchemaError`] when a migration step fails.
    pub fn initialise(&mut self) -> Result<(), SchemaError> {
        initialise_schema(&mut self.connection, self.geometry)
    }

    /// Remove all changesets and comments and reset the checkpoint.
    ///
    /// # Errors
    /// Returns a [`SchemaError`] when a statement fails.
    pub fn truncate(&mut self) -> Result<(), SchemaError> {
        truncate(&mut self.connection)
    }
}
