#![forbid(unsafe_code)]

use rusqlite::{Connection, Error as SqliteError, OptionalExtension};
use thiserror::Error;

pub const SCHEMA_VERSION: i64 = 1;

/// Sentinel stored in `last_sequence` before the checkpoint is bootstrapped.
pub(crate) const UNINITIALISED_SEQUENCE: i64 = -1;

/// Initialise the changeset schema inside an existing SQLite database.
///
/// The function enables foreign keys, creates the changeset, comment and
/// replication-state tables with their indexes, seeds the singleton state
/// row and records the schema version. When `geometry` is set the `geom`
/// column is added if it is missing. Existing installations must already
/// match the expected version.
///
/// # Examples
/// ```
/// use rusqlite::Connection;
/// use changeset_data::store::initialise_schema;
///
/// let mut conn = Connection::open_in_memory().expect("create in-memory database");
/// initialise_schema(&mut conn, false).expect("create changeset schema");
///
/// let sequence: i64 = conn
///     .query_row("SELECT last_sequence FROM osm_changeset_state", [], |row| row.get(0))
///     .expect("read replication state");
/// assert_eq!(sequence, -1);
/// ```
pub fn initialise_schema(connection: &mut Connection, geometry: bool) -> Result<(), SchemaError> {
    connection
        .pragma_update(None, "foreign_keys", true)
        .map_err(|source| SchemaError::ForeignKeys { source })?;

    let transaction = connection
        .transaction()
        .map_err(|source| SchemaError::Migration {
            step: "begin schema transaction",
            source,
        })?;

    create_core_tables(&transaction)?;
    create_indexes(&transaction)?;
    seed_state(&transaction)?;
    if geometry {
        ensure_geometry_column(&transaction)?;
    }
    ensure_schema_version(&transaction)?;

    transaction
        .commit()
        .map_err(|source| SchemaError::Migration {
            step: "commit schema transaction",
            source,
        })?;

    Ok(())
}

/// Delete every changeset and comment and reset the replication state to
/// its uninitialised sentinel.
///
/// # Errors
/// Returns [`SchemaError::Migration`] when a statement fails.
pub fn truncate(connection: &mut Connection) -> Result<(), SchemaError> {
    let transaction = connection
        .transaction()
        .map_err(|source| SchemaError::Migration {
            step: "begin truncate transaction",
            source,
        })?;
    run_migration_step(
        &transaction,
        "truncate osm_changeset_comment",
        "DELETE FROM osm_changeset_comment",
    )?;
    run_migration_step(&transaction, "truncate osm_changeset", "DELETE FROM osm_changeset")?;
    transaction
        .execute(
            "UPDATE osm_changeset_state
                SET last_sequence = ?1, last_timestamp = NULL, update_in_progress = 0",
            [UNINITIALISED_SEQUENCE],
        )
        .map_err(|source| SchemaError::Migration {
            step: "reset osm_changeset_state",
            source,
        })?;
    transaction
        .commit()
        .map_err(|source| SchemaError::Migration {
            step: "commit truncate transaction",
            source,
        })
}

fn create_core_tables(transaction: &rusqlite::Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "create osm_changeset",
        "CREATE TABLE IF NOT EXISTS osm_changeset (
            id INTEGER PRIMARY KEY,
            user_id INTEGER,
            created_at TEXT NOT NULL,
            min_lat REAL NOT NULL,
            max_lat REAL NOT NULL,
            min_lon REAL NOT NULL,
            max_lon REAL NOT NULL,
            centroid_lon REAL NOT NULL,
            centroid_lat REAL NOT NULL,
            closed_at TEXT NOT NULL,
            open INTEGER NOT NULL CHECK (open = 0),
            num_changes INTEGER,
            user_name TEXT,
            city_id TEXT,
            province_id TEXT,
            region_id TEXT,
            tags TEXT NOT NULL DEFAULT '{}'
        )",
    )?;
    run_migration_step(
        transaction,
        "create osm_changeset_comment",
        "CREATE TABLE IF NOT EXISTS osm_changeset_comment (
            comment_changeset_id INTEGER NOT NULL,
            comment_user_id INTEGER,
            comment_user_name TEXT,
            comment_date TEXT,
            comment_text TEXT NOT NULL,
            FOREIGN KEY (comment_changeset_id) REFERENCES osm_changeset(id) ON DELETE CASCADE
        )",
    )?;
    run_migration_step(
        transaction,
        "create osm_changeset_state",
        "CREATE TABLE IF NOT EXISTS osm_changeset_state (
            singleton INTEGER PRIMARY KEY CHECK (singleton = 1),
            last_sequence INTEGER NOT NULL DEFAULT -1,
            last_timestamp TEXT,
            update_in_progress INTEGER NOT NULL DEFAULT 0 CHECK (update_in_progress IN (0, 1))
        )",
    )
}

fn create_indexes(transaction: &rusqlite::Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "index osm_changeset_comment",
        "CREATE INDEX IF NOT EXISTS idx_osm_changeset_comment_changeset
            ON osm_changeset_comment(comment_changeset_id)",
    )?;
    run_migration_step(
        transaction,
        "index osm_changeset user",
        "CREATE INDEX IF NOT EXISTS idx_osm_changeset_user ON osm_changeset(user_id)",
    )?;
    run_migration_step(
        transaction,
        "index osm_changeset created_at",
        "CREATE INDEX IF NOT EXISTS idx_osm_changeset_created_at ON osm_changeset(created_at)",
    )?;
    run_migration_step(
        transaction,
        "index osm_changeset attribution",
        "CREATE INDEX IF NOT EXISTS idx_osm_changeset_attribution
            ON osm_changeset(region_id, province_id, city_id)",
    )
}

fn seed_state(transaction: &rusqlite::Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "seed osm_changeset_state",
        "INSERT OR IGNORE INTO osm_changeset_state (singleton, last_sequence, update_in_progress)
            VALUES (1, -1, 0)",
    )
}

fn ensure_geometry_column(transaction: &rusqlite::Transaction<'_>) -> Result<(), SchemaError> {
    let present: bool = transaction
        .query_row(
            "SELECT EXISTS (
                SELECT 1 FROM pragma_table_info('osm_changeset') WHERE name = 'geom'
            )",
            [],
            |row| row.get(0),
        )
        .map_err(|source| SchemaError::Migration {
            step: "inspect geometry column",
            source,
        })?;
    if present {
        return Ok(());
    }
    run_migration_step(
        transaction,
        "add geometry column",
        "ALTER TABLE osm_changeset ADD COLUMN geom TEXT",
    )
}

fn ensure_schema_version(transaction: &rusqlite::Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "create schema version table",
        "CREATE TABLE IF NOT EXISTS changeset_schema_version (
            version INTEGER PRIMARY KEY CHECK (version > 0),
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ) WITHOUT ROWID",
    )?;

    let existing_version: Option<i64> = transaction
        .query_row(
            "SELECT version FROM changeset_schema_version LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|source| SchemaError::Migration {
            step: "read schema version",
            source,
        })?;

    match existing_version {
        Some(version) if version == SCHEMA_VERSION => {}
        Some(found) => {
            return Err(SchemaError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found,
            });
        }
        None => {
            transaction
                .execute(
                    "INSERT INTO changeset_schema_version (version) VALUES (?1)",
                    [SCHEMA_VERSION],
                )
                .map_err(|source| SchemaError::Migration {
                    step: "record schema version",
                    source,
                })?;
        }
    }

    Ok(())
}

fn run_migration_step(
    transaction: &rusqlite::Transaction<'_>,
    step: &'static str,
    sql: &str,
) -> Result<(), SchemaError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| SchemaError::Migration { step, source })
}

/// Errors raised when initialising or truncating the changeset schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to enable SQLite foreign keys")]
    ForeignKeys {
        #[source]
        source: SqliteError,
    },
    #[error("failed to execute migration step '{step}'")]
    Migration {
        step: &'static str,
        #[source]
        source: SqliteError,
    },
    #[error(
        "expected changeset schema version {expected} but found {found}; apply migrations before retrying"
    )]
    VersionMismatch { expected: i64, found: i64 },
}
