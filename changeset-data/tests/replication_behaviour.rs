//! Behavioural tests for [`replicate`] and checkpoint bootstrapping.
//!
//! These tests use [`StubReplicationSource`] so no feed server is needed.

use std::cell::RefCell;
use std::fs;

use changeset_core::SequenceNumber;
use changeset_data::replication::test_support::StubReplicationSource;
use changeset_data::store::ContentionReason;
use changeset_data::test_support::{ChangesetXml, dump_xml, sample_enricher};
use changeset_data::{
    ChangesetStore, ReplicationError, ReplicationOutcome, TransportError,
    bootstrap_initial_sequence, replicate,
};
use chrono::{DateTime, TimeZone, Utc};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

mod support;

use support::{fixtures_dir, fresh_store};

fn seq(value: i64) -> SequenceNumber {
    SequenceNumber::try_from(value).unwrap_or_else(|err| panic!("invalid sequence {value}: {err}"))
}

fn last_run() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn listing(name: &str) -> String {
    let path = fixtures_dir().join(name);
    fs::read_to_string(&path).unwrap_or_else(|err| panic!("failed to read {path}: {err}"))
}

fn two_diffs() -> StubReplicationSource {
    StubReplicationSource::with_state(seq(7), last_run())
        .with_diff(seq(6), &dump_xml(&[ChangesetXml::closed(10)]))
        .with_diff(seq(7), &dump_xml(&[ChangesetXml::closed(11)]))
}

#[derive(Default)]
struct ReplicationWorld {
    store: RefCell<Option<ChangesetStore>>,
    feed: RefCell<Option<StubReplicationSource>>,
    result: RefCell<Option<Result<ReplicationOutcome, ReplicationError>>>,
}

impl ReplicationWorld {
    fn with_store<T>(&self, f: impl FnOnce(&ChangesetStore) -> T) -> T {
        let guard = self.store.borrow();
        f(guard.as_ref().expect("store prepared"))
    }

    fn with_feed<T>(&self, f: impl FnOnce(&StubReplicationSource) -> T) -> T {
        let guard = self.feed.borrow();
        f(guard.as_ref().expect("feed prepared"))
    }

    fn outcome(&self) -> ReplicationOutcome {
        self.result
            .borrow()
            .as_ref()
            .expect("replication was attempted")
            .as_ref()
            .expect("replication should succeed")
            .clone()
    }
}

#[fixture]
fn world() -> ReplicationWorld {
    ReplicationWorld::default()
}

#[given("a store checkpointed at sequence 5")]
fn checkpointed_store(#[from(world)] world: &ReplicationWorld) {
    let store = fresh_store();
    store
        .set_initial_sequence(seq(5))
        .expect("checkpoint bootstrapped");
    world.store.replace(Some(store));
}

#[given("an initialised store without a checkpoint")]
fn bare_store(#[from(world)] world: &ReplicationWorld) {
    world.store.replace(Some(fresh_store()));
}

#[given("a feed at sequence 7 with diffs 6 and 7")]
fn healthy_feed(#[from(world)] world: &ReplicationWorld) {
    world.feed.replace(Some(two_diffs()));
}

#[given("a feed at sequence 7 whose diff 7 fails")]
fn failing_feed(#[from(world)] world: &ReplicationWorld) {
    world
        .feed
        .replace(Some(two_diffs().with_failing_diff(seq(7))));
}

#[given("a feed whose listings lead past the dump timestamp")]
fn listed_feed(#[from(world)] world: &ReplicationWorld) {
    let feed = StubReplicationSource::with_state(seq(5_912_345), last_run())
        .with_listing("", &listing("listing-root.html"))
        .with_listing("005/", &listing("listing-005.html"))
        .with_listing("005/912/", &listing("listing-005-912.html"));
    world.feed.replace(Some(feed));
}

#[given("another run holds the replication flag")]
fn flag_held(#[from(world)] world: &ReplicationWorld) {
    world.with_store(|store| {
        store
            .connection()
            .execute("UPDATE osm_changeset_state SET update_in_progress = 1", [])
            .expect("flag set");
    });
}

#[when("I run replication")]
fn run_replication(#[from(world)] world: &ReplicationWorld) {
    let enricher = sample_enricher();
    let outcome =
        world.with_store(|store| world.with_feed(|feed| replicate(store, &enricher, feed)));
    world.result.replace(Some(outcome));
}

#[when("I bootstrap the checkpoint from the sample dump")]
fn bootstrap(#[from(world)] world: &ReplicationWorld) {
    let dump = changeset_fs::open_changeset_dump(&fixtures_dir().join("sample-dump.osm"))
        .expect("dump fixture opens");
    let sequence = world.with_store(|store| {
        world.with_feed(|feed| bootstrap_initial_sequence(store, feed, dump))
    });
    assert_eq!(sequence.expect("bootstrap succeeds"), seq(5_912_344));
}

#[then("sequences 6 through 7 are applied")]
fn applied(#[from(world)] world: &ReplicationWorld) {
    match world.outcome() {
        ReplicationOutcome::Applied { first, last, report } => {
            assert_eq!((first, last), (seq(6), seq(7)));
            assert_eq!(report.retained, 2);
        }
        other => panic!("expected diffs to be applied, got {other:?}"),
    }
}

#[then("diffs were fetched in order")]
fn fetched_in_order(#[from(world)] world: &ReplicationWorld) {
    assert_eq!(world.with_feed(StubReplicationSource::fetched), vec![seq(6), seq(7)]);
}

#[then("no diffs were fetched")]
fn nothing_fetched(#[from(world)] world: &ReplicationWorld) {
    assert!(world.with_feed(StubReplicationSource::fetched).is_empty());
}

#[then("the checkpoint is {sequence}")]
fn checkpoint_is(sequence: i64, #[from(world)] world: &ReplicationWorld) {
    let state = world.with_store(|store| store.replication_state().expect("state readable"));
    assert_eq!(state.last_sequence, Some(seq(sequence)));
}

#[then("the feed's last run is recorded")]
fn last_run_recorded(#[from(world)] world: &ReplicationWorld) {
    let state = world.with_store(|store| store.replication_state().expect("state readable"));
    assert_eq!(state.last_timestamp, Some(last_run()));
}

#[then("the in-progress flag is clear")]
fn flag_clear(#[from(world)] world: &ReplicationWorld) {
    let state = world.with_store(|store| store.replication_state().expect("state readable"));
    assert!(!state.update_in_progress);
}

#[then("replication fails with a transport error")]
fn transport_failure(#[from(world)] world: &ReplicationWorld) {
    let result = world.result.borrow();
    match result.as_ref().expect("replication was attempted") {
        Err(ReplicationError::Transport(TransportError::Http { status, .. })) => {
            assert_eq!(*status, 500);
        }
        other => panic!("expected an HTTP transport failure, got {other:?}"),
    }
}

#[then("the run is skipped as contended")]
fn contended(#[from(world)] world: &ReplicationWorld) {
    assert_eq!(
        world.outcome(),
        ReplicationOutcome::Contended {
            reason: ContentionReason::InProgressFlagSet
        }
    );
}

macro_rules! register_scenario {
    ($fn_name:ident, $title:literal) => {
        #[scenario(path = "tests/features/replication.feature", name = $title)]
        fn $fn_name(#[from(world)] world: ReplicationWorld) {
            let _ = world;
        }
    };
}

register_scenario!(applying_pending_diffs, "applying pending diffs in order");
register_scenario!(stopping_at_failed_diff, "stopping at the first failed diff");
register_scenario!(
    skipping_while_flag_held,
    "skipping while another run holds the flag"
);
register_scenario!(
    bootstrapping_from_dump,
    "bootstrapping the checkpoint from a dump"
);
