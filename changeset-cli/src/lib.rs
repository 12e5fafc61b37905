//! Command-line interface for the changeset mirror.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use changeset_data::ReplicationOutcome;

mod checkpoint;
mod error;
mod load;
mod replicate;
mod setup;

pub use error::CliError;

use checkpoint::{InitialSequenceArgs, UnlockArgs};
use load::LoadArgs;
use replicate::ReplicateArgs;

pub(crate) const ARG_DATABASE: &str = "database";
pub(crate) const ARG_FILE: &str = "file";
pub(crate) const ARG_BOUNDARIES_DIR: &str = "boundaries-dir";
pub(crate) const ARG_REPLICATION_URL: &str = "replication-url";
pub(crate) const ARG_USER_AGENT: &str = "user-agent";
pub(crate) const ARG_GEOMETRY: &str = "geometry";
pub(crate) const ARG_CREATE: &str = "create";
pub(crate) const ARG_TRUNCATE: &str = "truncate";
pub(crate) const ARG_SKIP_INITIAL_SEQUENCE: &str = "skip-initial-sequence";
pub(crate) const ARG_BATCH_SIZE: &str = "batch-size";

pub(crate) const ENV_LOAD_DATABASE: &str = "CHANGESET_MIRROR_CMDS_LOAD_DATABASE";
pub(crate) const ENV_LOAD_FILE: &str = "CHANGESET_MIRROR_CMDS_LOAD_FILE";
pub(crate) const ENV_REPLICATE_DATABASE: &str = "CHANGESET_MIRROR_CMDS_REPLICATE_DATABASE";
pub(crate) const ENV_INITIAL_SEQUENCE_DATABASE: &str =
    "CHANGESET_MIRROR_CMDS_SET_INITIAL_SEQUENCE_DATABASE";
pub(crate) const ENV_INITIAL_SEQUENCE_FILE: &str = "CHANGESET_MIRROR_CMDS_SET_INITIAL_SEQUENCE_FILE";
pub(crate) const ENV_UNLOCK_DATABASE: &str = "CHANGESET_MIRROR_CMDS_UNLOCK_DATABASE";

/// Exit status for any failure.
pub const FAILURE_EXIT_CODE: u8 = 2;

/// How a successful invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The command did its work.
    Completed,
    /// Another replication run holds the lock; nothing changed.
    Contended,
    /// The replication feed had nothing newer than the checkpoint.
    UpToDate,
}

impl RunStatus {
    /// Process exit code reported to operator tooling.
    ///
    /// `0` completed, `1` contended, `3` nothing new. Failures use
    /// [`FAILURE_EXIT_CODE`].
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::Contended => 1,
            Self::UpToDate => 3,
        }
    }
}

impl From<&ReplicationOutcome> for RunStatus {
    fn from(outcome: &ReplicationOutcome) -> Self {
        match outcome {
            ReplicationOutcome::Applied { .. } => Self::Completed,
            ReplicationOutcome::UpToDate { .. } => Self::UpToDate,
            ReplicationOutcome::Contended { .. } => Self::Contended,
        }
    }
}

/// Run the changeset mirror CLI with the current process arguments and
/// environment.
///
/// # Errors
/// Returns a [`CliError`] when arguments or configuration are invalid, or
/// when the selected command fails.
pub fn run() -> Result<RunStatus, CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Load(args) => load::run_load(args),
        Command::Replicate(args) => replicate::run_replicate(args),
        Command::SetInitialSequence(args) => checkpoint::run_set_initial_sequence(args),
        Command::Unlock(args) => checkpoint::run_unlock(args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "changeset-mirror",
    about = "Mirror OpenStreetMap changeset metadata into SQLite",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a bulk changeset dump.
    Load(LoadArgs),
    /// Apply every replication diff newer than the checkpoint.
    Replicate(ReplicateArgs),
    /// Align the checkpoint with the generation time of a dump.
    SetInitialSequence(InitialSequenceArgs),
    /// Clear the in-progress flag left behind by a crashed replication run.
    Unlock(UnlockArgs),
}

#[cfg(test)]
mod tests;
