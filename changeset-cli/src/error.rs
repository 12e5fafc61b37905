//! Error types emitted by the changeset mirror CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use changeset_core::BoundaryError;
use changeset_data::{
    DiscoveryError, IngestError, ReplicationError, SchemaError, StoreError, TransportError,
};
use thiserror::Error;

/// Errors emitted by the changeset mirror CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open database {path:?}: {source}")]
    OpenStore {
        path: Utf8PathBuf,
        #[source]
        source: StoreError,
    },
    /// Creating or truncating the schema failed.
    #[error("failed to prepare schema in {path:?}: {source}")]
    Schema {
        path: Utf8PathBuf,
        #[source]
        source: SchemaError,
    },
    /// Reading or updating the replication checkpoint failed.
    #[error("failed to access replication state: {0}")]
    State(#[from] StoreError),
    /// Boundary datasets could not be loaded.
    #[error("failed to load boundaries from {dir:?}: {source}")]
    Boundaries {
        dir: Utf8PathBuf,
        #[source]
        source: BoundaryError,
    },
    /// Opening a changeset dump failed.
    #[error("failed to open changeset dump {path:?}: {source}")]
    OpenDump {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Loading a changeset dump failed part-way; committed batches remain.
    #[error("failed to load changeset dump {path:?}: {source}")]
    Load {
        path: Utf8PathBuf,
        #[source]
        source: IngestError,
    },
    /// Building the replication feed client failed.
    #[error("failed to configure replication feed {url:?}: {source}")]
    ReplicationSource {
        url: String,
        #[source]
        source: TransportError,
    },
    /// A replication run failed.
    #[error("replication failed: {0}")]
    Replication(#[from] ReplicationError),
    /// The initial sequence could not be discovered.
    #[error("failed to set the initial sequence: {0}")]
    Discovery(#[from] DiscoveryError),
}
