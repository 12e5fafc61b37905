//! Resources shared by the subcommands: the store, boundaries, dumps and the
//! feed client.

use camino::{Utf8Path, Utf8PathBuf};
use changeset_core::Enricher;
use changeset_data::replication::{
    DEFAULT_REPLICATION_URL, DEFAULT_USER_AGENT, HttpReplicationSource,
    HttpReplicationSourceConfig,
};
use changeset_data::{ChangesetStore, SchemaError};
use changeset_fs::DumpReader;
use log::info;

use crate::{ARG_DATABASE, ARG_FILE, CliError};

/// Boundary directory used when none is configured.
pub(crate) const DEFAULT_BOUNDARIES_DIR: &str = "GeoJSON";

/// Schema work requested before a command touches the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SchemaActions {
    pub(crate) geometry: bool,
    pub(crate) create: bool,
    pub(crate) truncate: bool,
}

/// Open the database, creating and truncating the schema when asked.
///
/// Without `create` the database file must already exist, so a typo in the
/// path is reported instead of silently creating an empty database.
pub(crate) fn open_store(
    path: &Utf8Path,
    actions: SchemaActions,
) -> Result<ChangesetStore, CliError> {
    if !actions.create {
        require_existing(path, ARG_DATABASE)?;
    }
    let mut store = ChangesetStore::open(path)
        .map_err(|source| CliError::OpenStore {
            path: path.to_path_buf(),
            source,
        })?
        .with_geometry(actions.geometry);
    let schema_error = |source: SchemaError| CliError::Schema {
        path: path.to_path_buf(),
        source,
    };
    if actions.create {
        store.initialise().map_err(schema_error)?;
        info!("schema ready in {path}");
    }
    if actions.truncate {
        store.truncate().map_err(schema_error)?;
        info!("truncated changeset tables in {path}");
    }
    Ok(store)
}

/// Load the boundary datasets from `dir` into an enricher.
pub(crate) fn load_enricher(dir: &Utf8Path) -> Result<Enricher, CliError> {
    let boundaries =
        changeset_data::load_boundaries(dir).map_err(|source| CliError::Boundaries {
            dir: dir.to_path_buf(),
            source,
        })?;
    info!(
        "loaded {} regions, {} provinces and {} cities from {dir}",
        boundaries.regions.len(),
        boundaries.provinces.len(),
        boundaries.cities.len()
    );
    Ok(Enricher::new(boundaries))
}

/// Open a plain, gzip or bzip2 changeset dump.
pub(crate) fn open_dump(path: &Utf8Path) -> Result<DumpReader, CliError> {
    require_existing(path, ARG_FILE)?;
    changeset_fs::open_changeset_dump(path).map_err(|source| CliError::OpenDump {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match changeset_fs::file_is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            })
        }
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Resolve the boundary directory, falling back to [`DEFAULT_BOUNDARIES_DIR`].
pub(crate) fn boundaries_dir(configured: Option<Utf8PathBuf>) -> Utf8PathBuf {
    configured.unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_BOUNDARIES_DIR))
}

/// Where and how to reach the replication feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FeedSettings {
    pub(crate) url: String,
    pub(crate) user_agent: String,
}

impl FeedSettings {
    pub(crate) fn new(url: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            url: url.unwrap_or_else(|| DEFAULT_REPLICATION_URL.to_owned()),
            user_agent: user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
        }
    }

    pub(crate) fn connect(&self) -> Result<HttpReplicationSource, CliError> {
        let config = HttpReplicationSourceConfig::new(self.url.clone())
            .with_user_agent(self.user_agent.clone());
        HttpReplicationSource::with_config(config).map_err(|source| {
            CliError::ReplicationSource {
                url: self.url.clone(),
                source,
            }
        })
    }
}
