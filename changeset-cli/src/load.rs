//! Load command implementation for the changeset mirror CLI.

use camino::Utf8PathBuf;
use changeset_data::replication::{ReplicationSource, bootstrap_initial_sequence};
use changeset_data::{ChangesetParser, IngestMode, parse::DEFAULT_BATCH_SIZE};
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::setup::{
    FeedSettings, SchemaActions, boundaries_dir, load_enricher, open_dump, open_store,
    require_existing,
};
use crate::{
    ARG_BATCH_SIZE, ARG_BOUNDARIES_DIR, ARG_CREATE, ARG_DATABASE, ARG_FILE, ARG_GEOMETRY,
    ARG_REPLICATION_URL, ARG_SKIP_INITIAL_SEQUENCE, ARG_TRUNCATE, ARG_USER_AGENT, CliError,
    ENV_LOAD_DATABASE, ENV_LOAD_FILE, RunStatus,
};

/// CLI arguments for the `load` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "load",
    long_about = "Parse a full changeset dump into the database. Only closed \
                 changesets whose centre lies inside the national boundary \
                 are kept. Unless skipped, the replication checkpoint is then \
                 aligned with the dump's generation time.",
    about = "Load a bulk changeset dump"
)]
#[ortho_config(prefix = "CHANGESET_MIRROR")]
pub(crate) struct LoadArgs {
    /// Path to the SQLite database.
    #[arg(short = 'd', long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Changeset dump to parse (`.osm`, `.osm.bz2` or `.osm.gz`).
    #[arg(short = 'f', long = ARG_FILE, value_name = "path")]
    #[serde(default)]
    pub(crate) file: Option<Utf8PathBuf>,
    /// Directory holding the four boundary GeoJSON files.
    #[arg(long = ARG_BOUNDARIES_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) boundaries_dir: Option<Utf8PathBuf>,
    /// Create the schema before loading.
    #[arg(short = 'c', long = ARG_CREATE)]
    #[serde(default)]
    pub(crate) create: bool,
    /// Empty the changeset tables and reset the checkpoint before loading.
    #[arg(short = 't', long = ARG_TRUNCATE)]
    #[serde(default)]
    pub(crate) truncate: bool,
    /// Store each changeset's bounding rectangle as geometry.
    #[arg(short = 'g', long = ARG_GEOMETRY)]
    #[serde(default)]
    pub(crate) geometry: bool,
    /// Leave the replication checkpoint untouched.
    #[arg(long = ARG_SKIP_INITIAL_SEQUENCE)]
    #[serde(default)]
    pub(crate) skip_initial_sequence: bool,
    /// Retained changesets per committed batch.
    #[arg(long = ARG_BATCH_SIZE, value_name = "count")]
    #[serde(default)]
    pub(crate) batch_size: Option<u64>,
    /// Base URL of the replication feed.
    #[arg(long = ARG_REPLICATION_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) replication_url: Option<String>,
    /// User agent sent to the replication feed.
    #[arg(long = ARG_USER_AGENT, value_name = "agent")]
    #[serde(default)]
    pub(crate) user_agent: Option<String>,
}

impl LoadArgs {
    pub(crate) fn into_config(self) -> Result<LoadConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        LoadConfig::try_from(merged)
    }
}

/// Resolved `load` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) file: Utf8PathBuf,
    pub(crate) boundaries_dir: Utf8PathBuf,
    pub(crate) schema: SchemaActions,
    pub(crate) batch_size: u64,
    /// `None` when the checkpoint should not be bootstrapped.
    pub(crate) feed: Option<FeedSettings>,
}

impl LoadConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.file, ARG_FILE)
    }
}

impl TryFrom<LoadArgs> for LoadConfig {
    type Error = CliError;

    fn try_from(args: LoadArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_LOAD_DATABASE,
        })?;
        let file = args.file.ok_or(CliError::MissingArgument {
            field: ARG_FILE,
            env: ENV_LOAD_FILE,
        })?;
        let feed = (!args.skip_initial_sequence)
            .then(|| FeedSettings::new(args.replication_url, args.user_agent));
        Ok(Self {
            database,
            file,
            boundaries_dir: boundaries_dir(args.boundaries_dir),
            schema: SchemaActions {
                geometry: args.geometry,
                create: args.create,
                truncate: args.truncate,
            },
            batch_size: args.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            feed,
        })
    }
}

pub(super) fn run_load(args: LoadArgs) -> Result<RunStatus, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    match &config.feed {
        Some(settings) => {
            let source = settings.connect()?;
            execute_load(&config, Some(&source))
        }
        None => execute_load(&config, None),
    }
}

/// Load the dump, then bootstrap the checkpoint through `feed` when given.
pub(super) fn execute_load(
    config: &LoadConfig,
    feed: Option<&dyn ReplicationSource>,
) -> Result<RunStatus, CliError> {
    let store = open_store(&config.database, config.schema)?;
    let enricher = load_enricher(&config.boundaries_dir)?;
    info!("loading changesets from {}", config.file);
    let report = ChangesetParser::new(&store, &enricher, IngestMode::Bulk)
        .with_batch_size(config.batch_size)
        .ingest(open_dump(&config.file)?)
        .map_err(|source| CliError::Load {
            path: config.file.clone(),
            source,
        })?;
    info!(
        "stored {} of {} closed changesets from {}",
        report.retained, report.considered, config.file
    );

    if let Some(source) = feed {
        let sequence = bootstrap_initial_sequence(&store, source, open_dump(&config.file)?)?;
        info!("replication will resume after sequence {sequence}");
    } else {
        info!("skipping initial sequence discovery");
    }
    Ok(RunStatus::Completed)
}
