//! Checkpoint maintenance commands: `set-initial-sequence` and `unlock`.

use camino::{Utf8Path, Utf8PathBuf};
use changeset_data::replication::{ReplicationSource, bootstrap_initial_sequence};
use clap::Parser;
use log::{info, warn};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::setup::{FeedSettings, SchemaActions, open_dump, open_store};
use crate::{
    ARG_DATABASE, ARG_FILE, ARG_REPLICATION_URL, ARG_USER_AGENT, CliError,
    ENV_INITIAL_SEQUENCE_DATABASE, ENV_INITIAL_SEQUENCE_FILE, ENV_UNLOCK_DATABASE, RunStatus,
};

/// CLI arguments for the `set-initial-sequence` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "set-initial-sequence",
    long_about = "Read the generation timestamp from a changeset dump and \
                 store the first replication sequence published at or after \
                 it as the checkpoint.",
    about = "Align the checkpoint with a dump"
)]
#[ortho_config(prefix = "CHANGESET_MIRROR")]
pub(crate) struct InitialSequenceArgs {
    /// Path to the SQLite database.
    #[arg(short = 'd', long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Changeset dump whose timestamp anchors the checkpoint.
    #[arg(short = 'f', long = ARG_FILE, value_name = "path")]
    #[serde(default)]
    pub(crate) file: Option<Utf8PathBuf>,
    /// Base URL of the replication feed.
    #[arg(long = ARG_REPLICATION_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) replication_url: Option<String>,
    /// User agent sent to the replication feed.
    #[arg(long = ARG_USER_AGENT, value_name = "agent")]
    #[serde(default)]
    pub(crate) user_agent: Option<String>,
}

/// Resolved `set-initial-sequence` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InitialSequenceConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) file: Utf8PathBuf,
    pub(crate) feed: FeedSettings,
}

impl TryFrom<InitialSequenceArgs> for InitialSequenceConfig {
    type Error = CliError;

    fn try_from(args: InitialSequenceArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_INITIAL_SEQUENCE_DATABASE,
        })?;
        let file = args.file.ok_or(CliError::MissingArgument {
            field: ARG_FILE,
            env: ENV_INITIAL_SEQUENCE_FILE,
        })?;
        Ok(Self {
            database,
            file,
            feed: FeedSettings::new(args.replication_url, args.user_agent),
        })
    }
}

pub(super) fn run_set_initial_sequence(args: InitialSequenceArgs) -> Result<RunStatus, CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let config = InitialSequenceConfig::try_from(merged)?;
    let source = config.feed.connect()?;
    execute_set_initial_sequence(&config, &source)
}

pub(super) fn execute_set_initial_sequence(
    config: &InitialSequenceConfig,
    source: &dyn ReplicationSource,
) -> Result<RunStatus, CliError> {
    let store = open_store(&config.database, SchemaActions::default())?;
    let sequence = bootstrap_initial_sequence(&store, source, open_dump(&config.file)?)?;
    info!("checkpoint set to sequence {sequence}");
    Ok(RunStatus::Completed)
}

/// CLI arguments for the `unlock` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "unlock",
    long_about = "Clear the replication in-progress flag. Only do this once \
                 no replication run is active, typically after a crash left \
                 the flag set.",
    about = "Clear a stuck replication flag"
)]
#[ortho_config(prefix = "CHANGESET_MIRROR")]
pub(crate) struct UnlockArgs {
    /// Path to the SQLite database.
    #[arg(short = 'd', long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
}

pub(super) fn run_unlock(args: UnlockArgs) -> Result<RunStatus, CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let database = merged.database.ok_or(CliError::MissingArgument {
        field: ARG_DATABASE,
        env: ENV_UNLOCK_DATABASE,
    })?;
    execute_unlock(&database)
}

pub(super) fn execute_unlock(database: &Utf8Path) -> Result<RunStatus, CliError> {
    let store = open_store(database, SchemaActions::default())?;
    if store.unlock_replication()? {
        warn!("cleared the replication in-progress flag in {database}");
    } else {
        info!("replication flag in {database} was not set");
    }
    Ok(RunStatus::Completed)
}
