//! Replicate command implementation for the changeset mirror CLI.

use camino::Utf8PathBuf;
use changeset_data::parse::DEFAULT_BATCH_SIZE;
use changeset_data::replication::{ReplicationSource, Replicator};
use changeset_data::ReplicationOutcome;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::setup::{FeedSettings, SchemaActions, boundaries_dir, load_enricher, open_store};
use crate::{
    ARG_BATCH_SIZE, ARG_BOUNDARIES_DIR, ARG_DATABASE, ARG_GEOMETRY, ARG_REPLICATION_URL,
    ARG_USER_AGENT, CliError, ENV_REPLICATE_DATABASE, RunStatus,
};

/// CLI arguments for the `replicate` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "replicate",
    long_about = "Fetch and apply, in order, every replication diff newer \
                 than the stored checkpoint. Exits 1 when another run holds \
                 the lock and 3 when there is nothing new.",
    about = "Catch up from the replication feed"
)]
#[ortho_config(prefix = "CHANGESET_MIRROR")]
pub(crate) struct ReplicateArgs {
    /// Path to the SQLite database.
    #[arg(short = 'd', long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Directory holding the four boundary GeoJSON files.
    #[arg(long = ARG_BOUNDARIES_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) boundaries_dir: Option<Utf8PathBuf>,
    /// Store each changeset's bounding rectangle as geometry.
    #[arg(short = 'g', long = ARG_GEOMETRY)]
    #[serde(default)]
    pub(crate) geometry: bool,
    /// Retained changesets per committed batch within a diff.
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

impl ReplicateArgs {
    pub(crate) fn into_config(self) -> Result<ReplicateConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ReplicateConfig::try_from(merged)
    }
}

/// Resolved `replicate` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReplicateConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) boundaries_dir: Utf8PathBuf,
    pub(crate) geometry: bool,
    pub(crate) batch_size: u64,
    pub(crate) feed: FeedSettings,
}

impl TryFrom<ReplicateArgs> for ReplicateConfig {
    type Error = CliError;

    fn try_from(args: ReplicateArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_REPLICATE_DATABASE,
        })?;
        Ok(Self {
            database,
            boundaries_dir: boundaries_dir(args.boundaries_dir),
            geometry: args.geometry,
            batch_size: args.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            feed: FeedSettings::new(args.replication_url, args.user_agent),
        })
    }
}

pub(super) fn run_replicate(args: ReplicateArgs) -> Result<RunStatus, CliError> {
    let config = args.into_config()?;
    let source = config.feed.connect()?;
    execute_replicate(&config, &source)
}

/// Run one replication cycle against `source`.
pub(super) fn execute_replicate(
    config: &ReplicateConfig,
    source: &dyn ReplicationSource,
) -> Result<RunStatus, CliError> {
    let store = open_store(
        &config.database,
        SchemaActions {
            geometry: config.geometry,
            ..SchemaActions::default()
        },
    )?;
    let enricher = load_enricher(&config.boundaries_dir)?;
    let outcome = Replicator::new(&store, &enricher, source)
        .with_batch_size(config.batch_size)
        .run()?;
    match &outcome {
        ReplicationOutcome::Applied {
            first,
            last,
            report,
        } => info!(
            "applied sequences {first}..={last}: stored {} of {} changesets",
            report.retained, report.considered
        ),
        ReplicationOutcome::UpToDate { sequence } => {
            info!("already up to date at sequence {sequence}");
        }
        ReplicationOutcome::Contended { .. } => {
            info!("another replication run is in progress; nothing done");
        }
    }
    Ok(RunStatus::from(&outcome))
}
