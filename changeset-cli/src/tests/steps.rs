//! Behaviour-driven step definitions driving the command scenarios.

use super::helpers::{DISCOVERED_SEQUENCE, Workspace, listed_feed};
use super::*;
use crate::checkpoint::execute_unlock;
use crate::load::execute_load;
use crate::replicate::{ReplicateConfig, execute_replicate};
use changeset_data::replication::test_support::StubReplicationSource;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;

/// Scenario state shared between steps.
struct CommandWorld {
    workspace: RefCell<Option<Workspace>>,
    feed: StubReplicationSource,
    cli_args: RefCell<Vec<String>>,
    config_error: RefCell<Option<CliError>>,
    status: RefCell<Option<Result<RunStatus, CliError>>>,
}

impl CommandWorld {
    fn new() -> Self {
        Self {
            workspace: RefCell::new(None),
            feed: listed_feed(DISCOVERED_SEQUENCE),
            cli_args: RefCell::new(vec!["changeset-mirror".to_owned()]),
            config_error: RefCell::new(None),
            status: RefCell::new(None),
        }
    }

    fn with_workspace<T>(&self, f: impl FnOnce(&Workspace) -> T) -> T {
        let guard = self.workspace.borrow();
        let workspace = guard
            .as_ref()
            .unwrap_or_else(|| panic!("workspace should be prepared"));
        f(workspace)
    }

    fn record(&self, status: Result<RunStatus, CliError>) {
        *self.status.borrow_mut() = Some(status);
    }
}

#[fixture]
fn world() -> CommandWorld {
    CommandWorld::new()
}

#[given("a workspace with boundaries and a changeset dump")]
fn workspace_exists(#[from(world)] world: &CommandWorld) {
    *world.workspace.borrow_mut() = Some(Workspace::new());
}

#[given("the dump has been loaded")]
fn dump_loaded(#[from(world)] world: &CommandWorld) {
    world.with_workspace(|workspace| {
        execute_load(&workspace.load_config(true), Some(&world.feed))
            .unwrap_or_else(|err| panic!("load should succeed: {err}"));
    });
}

#[given("the replication flag is stuck")]
fn flag_stuck(#[from(world)] world: &CommandWorld) {
    world.with_workspace(|workspace| {
        workspace
            .store()
            .connection()
            .execute("UPDATE osm_changeset_state SET update_in_progress = 1", [])
            .unwrap_or_else(|err| panic!("set flag: {err}"));
    });
}

#[given("I pass only the replicate subcommand")]
fn replicate_only(#[from(world)] world: &CommandWorld) {
    world.cli_args.borrow_mut().push("replicate".to_owned());
}

#[when("I load the dump with schema creation")]
fn load_dump(#[from(world)] world: &CommandWorld) {
    let status =
        world.with_workspace(|workspace| execute_load(&workspace.load_config(true), Some(&world.feed)));
    world.record(status);
}

#[when("I run replicate")]
fn run_replicate(#[from(world)] world: &CommandWorld) {
    let status = world
        .with_workspace(|workspace| execute_replicate(&workspace.replicate_config(), &world.feed));
    world.record(status);
}

#[when("I unlock the database")]
fn unlock(#[from(world)] world: &CommandWorld) {
    let status = world.with_workspace(|workspace| execute_unlock(&workspace.database()));
    world.record(status);
}

#[when("I configure the replicate command")]
fn configure_replicate(#[from(world)] world: &CommandWorld) {
    let args = world.cli_args.borrow().clone();
    let cli = Cli::try_parse_from(args).unwrap_or_else(|err| panic!("arguments parse: {err}"));
    let Command::Replicate(args) = cli.command else {
        panic!("expected the replicate command");
    };
    *world.config_error.borrow_mut() = ReplicateConfig::try_from(args).err();
}

#[then("the command exits with code {code}")]
fn exits_with(code: u8, #[from(world)] world: &CommandWorld) {
    let guard = world.status.borrow();
    match guard.as_ref() {
        Some(Ok(status)) => assert_eq!(status.exit_code(), code),
        Some(Err(err)) => panic!("command failed: {err}"),
        None => panic!("no command was run"),
    }
}

#[then("the database holds {count} changesets")]
fn holds_changesets(count: usize, #[from(world)] world: &CommandWorld) {
    world.with_workspace(|workspace| assert_eq!(workspace.stored_ids().len(), count));
}

#[then("the checkpoint matches the dump timestamp")]
fn checkpoint_matches(#[from(world)] world: &CommandWorld) {
    let state = world.with_workspace(|workspace| {
        workspace
            .store()
            .replication_state()
            .unwrap_or_else(|err| panic!("read state: {err}"))
    });
    let sequence = state
        .last_sequence
        .unwrap_or_else(|| panic!("checkpoint should be set"));
    assert_eq!(i64::from(sequence.get()), DISCOVERED_SEQUENCE);
    assert!(!state.update_in_progress);
}

#[then("the CLI reports that the \"database\" flag is missing")]
fn reports_missing_database(#[from(world)] world: &CommandWorld) {
    match world.config_error.borrow().as_ref() {
        Some(CliError::MissingArgument { field, env }) => {
            assert_eq!(*field, ARG_DATABASE);
            assert_eq!(*env, ENV_REPLICATE_DATABASE);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

macro_rules! register_command_scenario {
    ($fn_name:ident, $scenario_title:literal) => {
        #[scenario(path = "tests/features/commands.feature", name = $scenario_title)]
        fn $fn_name(#[from(world)] world: CommandWorld) {
            let _ = world;
        }
    };
}

register_command_scenario!(loading_aligns_checkpoint, "loading a dump and aligning the checkpoint");
register_command_scenario!(
    replicating_under_contention,
    "replicating while another run holds the flag"
);
register_command_scenario!(rejecting_missing_database, "rejecting a missing database flag");
