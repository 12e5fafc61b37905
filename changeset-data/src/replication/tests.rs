use super::test_support::StubReplicationSource;
use super::*;
use crate::parse::IngestReport;
use crate::store::{ChangesetStore, ContentionReason};
use crate::test_support::{ChangesetXml, dump_xml, sample_enricher};
use changeset_core::{Enricher, SequenceNumber};
use chrono::{DateTime, TimeZone, Utc};
use rstest::{fixture, rstest};

fn seq(value: i64) -> SequenceNumber {
    SequenceNumber::try_from(value).expect("valid sequence")
}

fn last_run() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn stored_ids(store: &ChangesetStore) -> Vec<i64> {
    let mut statement = store
        .connection()
        .prepare("SELECT id FROM osm_changeset ORDER BY id")
        .expect("prepare id query");
    statement
        .query_map([], |row| row.get(0))
        .expect("query ids")
        .collect::<Result<_, _>>()
        .expect("read ids")
}

#[fixture]
fn store() -> ChangesetStore {
    let mut store = ChangesetStore::open_in_memory().expect("open store");
    store.initialise().expect("initialise schema");
    store.set_initial_sequence(seq(5)).expect("bootstrap");
    store
}

#[fixture]
fn enricher() -> Enricher {
    sample_enricher()
}

#[fixture]
fn feed() -> StubReplicationSource {
    StubReplicationSource::with_state(seq(7), last_run())
        .with_diff(seq(6), &dump_xml(&[ChangesetXml::closed(10)]))
        .with_diff(
            seq(7),
            &dump_xml(&[ChangesetXml::closed(11), ChangesetXml::open(12)]),
        )
}

#[rstest]
fn applies_pending_diffs_in_order(
    store: ChangesetStore,
    enricher: Enricher,
    feed: StubReplicationSource,
) {
    let outcome = replicate(&store, &enricher, &feed).expect("replication succeeds");

    assert_eq!(
        outcome,
        ReplicationOutcome::Applied {
            first: seq(6),
            last: seq(7),
            report: IngestReport {
                considered: 2,
                retained: 2,
                batches: 2
            },
        }
    );
    assert_eq!(feed.fetched(), vec![seq(6), seq(7)]);
    assert_eq!(stored_ids(&store), vec![10, 11]);
    let state = store.replication_state().expect("state");
    assert_eq!(state.last_sequence, Some(seq(7)));
    assert_eq!(state.last_timestamp, Some(last_run()));
    assert!(!state.update_in_progress);
}

#[rstest]
fn failed_diff_keeps_earlier_checkpoint_and_unlocks(
    store: ChangesetStore,
    enricher: Enricher,
    feed: StubReplicationSource,
) {
    let feed = feed.with_failing_diff(seq(7));
    let err = replicate(&store, &enricher, &feed).expect_err("second diff fails");

    assert!(matches!(
        err,
        ReplicationError::Transport(TransportError::Http { status: 500, .. })
    ));
    let state = store.replication_state().expect("state");
    assert_eq!(state.last_sequence, Some(seq(6)));
    assert_eq!(state.last_timestamp, None);
    assert!(!state.update_in_progress);
    assert_eq!(stored_ids(&store), vec![10]);
}

#[rstest]
fn malformed_diff_is_a_parse_failure(store: ChangesetStore, enricher: Enricher) {
    let feed = StubReplicationSource::with_state(seq(6), last_run())
        .with_diff(seq(6), "<osm><changeset id=\"1\"");
    let err = replicate(&store, &enricher, &feed).expect_err("bad diff");

    assert!(matches!(err, ReplicationError::Parse { sequence: 6, .. }));
    let state = store.replication_state().expect("state");
    assert_eq!(state.last_sequence, Some(seq(5)));
    assert!(!state.update_in_progress);
}

#[rstest]
fn nothing_to_apply_is_up_to_date(store: ChangesetStore, enricher: Enricher) {
    let feed = StubReplicationSource::with_state(seq(5), last_run());
    let outcome = replicate(&store, &enricher, &feed).expect("replication succeeds");

    assert_eq!(outcome, ReplicationOutcome::UpToDate { sequence: seq(5) });
    assert!(feed.fetched().is_empty());
    let state = store.replication_state().expect("state");
    assert_eq!(state.last_timestamp, None);
    assert!(!state.update_in_progress);
}

#[rstest]
fn uninitialised_checkpoint_is_rejected(enricher: Enricher, feed: StubReplicationSource) {
    let mut store = ChangesetStore::open_in_memory().expect("open store");
    store.initialise().expect("initialise schema");

    let err = replicate(&store, &enricher, &feed).expect_err("not bootstrapped");

    assert!(matches!(err, ReplicationError::NotInitialised));
    assert!(feed.fetched().is_empty());
    assert!(!store.replication_state().expect("state").update_in_progress);
}

#[rstest]
fn set_flag_is_benign_contention(
    store: ChangesetStore,
    enricher: Enricher,
    feed: StubReplicationSource,
) {
    store
        .connection()
        .execute("UPDATE osm_changeset_state SET update_in_progress = 1", [])
        .expect("simulate crashed run");
    let before = store.replication_state().expect("state");

    let outcome = replicate(&store, &enricher, &feed).expect("contention is not an error");

    assert_eq!(
        outcome,
        ReplicationOutcome::Contended {
            reason: ContentionReason::InProgressFlagSet
        }
    );
    assert_eq!(store.replication_state().expect("state"), before);
    assert!(feed.fetched().is_empty());
}

#[rstest]
fn unreachable_state_descriptor_unlocks(store: ChangesetStore, enricher: Enricher) {
    let feed = StubReplicationSource::with_state_error();
    let mut replicator = Replicator::new(&store, &enricher, &feed);
    let err = replicator.run().expect_err("state fetch fails");

    assert!(matches!(
        err,
        ReplicationError::Transport(TransportError::Network { .. })
    ));
    assert_eq!(
        replicator.phase(),
        ReplicationPhase::Unlocked { success: false }
    );
    assert!(!store.replication_state().expect("state").update_in_progress);
}

#[rstest]
fn later_diff_wins_when_ids_collide(store: ChangesetStore, enricher: Enricher) {
    let feed = StubReplicationSource::with_state(seq(7), last_run())
        .with_diff(
            seq(6),
            &dump_xml(&[ChangesetXml::closed(10)
                .with_tag("source", "survey")
                .with_comment(1, Some("first pass"))]),
        )
        .with_diff(
            seq(7),
            &dump_xml(&[ChangesetXml::closed(10)
                .with_tag("source", "imagery")
                .with_comment(2, Some("second pass"))
                .with_comment(3, Some("follow-up"))]),
        );

    replicate(&store, &enricher, &feed).expect("replication succeeds");

    assert_eq!(stored_ids(&store), vec![10]);
    let tags: String = store
        .connection()
        .query_row("SELECT tags FROM osm_changeset WHERE id = 10", [], |row| {
            row.get(0)
        })
        .expect("changeset 10 stored");
    assert!(tags.contains("imagery"), "{tags}");
    assert!(!tags.contains("survey"), "{tags}");
    let mut statement = store
        .connection()
        .prepare(
            "SELECT comment_text FROM osm_changeset_comment
             WHERE comment_changeset_id = 10 ORDER BY comment_user_id",
        )
        .expect("prepare comment query");
    let comments: Vec<String> = statement
        .query_map([], |row| row.get(0))
        .expect("query comments")
        .collect::<Result<_, _>>()
        .expect("read comments");
    assert_eq!(comments, vec!["second pass", "follow-up"]);
}

#[rstest]
fn replaying_a_diff_converges(store: ChangesetStore, enricher: Enricher) {
    let diff = dump_xml(&[
        ChangesetXml::closed(20).with_comment(1, Some("first")),
        ChangesetXml::closed(21).with_tag("source", "survey"),
    ]);
    let feed = StubReplicationSource::with_state(seq(6), last_run()).with_diff(seq(6), &diff);

    replicate(&store, &enricher, &feed).expect("first application");
    let comments_once: i64 = store
        .connection()
        .query_row("SELECT COUNT(*) FROM osm_changeset_comment", [], |row| {
            row.get(0)
        })
        .expect("count comments");

    store.set_initial_sequence(seq(5)).expect("rewind checkpoint");
    replicate(&store, &enricher, &feed).expect("replay");
    let comments_twice: i64 = store
        .connection()
        .query_row("SELECT COUNT(*) FROM osm_changeset_comment", [], |row| {
            row.get(0)
        })
        .expect("count comments");

    assert_eq!(stored_ids(&store), vec![20, 21]);
    assert_eq!(comments_once, 1);
    assert_eq!(comments_twice, 1);
}

fn directory(entries: &[(&str, &str)]) -> String {
    entries
        .iter()
        .map(|(group, stamp)| format!("<a href=\"{group}/\">{group}/</a>    {stamp}    -\n"))
        .collect()
}

fn leaf(entries: &[(&str, &str)]) -> String {
    entries
        .iter()
        .map(|(group, stamp)| {
            format!(
                "<a href=\"{group}.osm.gz\">{group}.osm.gz</a>  {stamp}  1K\n\
                 <a href=\"{group}.state.txt\">{group}.state.txt</a>  {stamp}  52\n"
            )
        })
        .collect()
}

#[fixture]
fn listed_feed() -> StubReplicationSource {
    StubReplicationSource::with_state(seq(5_912_345), last_run())
        .with_listing(
            "",
            &directory(&[("004", "2024-02-20 00:00"), ("005", "2024-03-10 00:00")]),
        )
        .with_listing(
            "005/",
            &directory(&[
                ("911", "2024-02-28 00:00"),
                ("912", "2024-03-02 00:00"),
                ("913", "2024-03-10 00:00"),
            ]),
        )
        .with_listing(
            "005/912/",
            &leaf(&[
                ("343", "2024-03-01 00:00"),
                ("344", "2024-03-01 00:01"),
                ("345", "2024-03-01 00:02"),
            ]),
        )
}

#[rstest]
fn discovery_accepts_zero_delta(listed_feed: StubReplicationSource) {
    let target = Utc.with_ymd_and_hms(2024, 3, 1, 0, 1, 0).unwrap();
    let sequence = SequenceDiscovery::new(&listed_feed)
        .discover(target)
        .expect("sequence discovered");
    assert_eq!(sequence, seq(5_912_344));
}

#[rstest]
fn discovery_reports_missing_successor(listed_feed: StubReplicationSource) {
    let target = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
    let err = SequenceDiscovery::new(&listed_feed)
        .discover(target)
        .expect_err("nothing after target");
    assert!(matches!(err, DiscoveryError::NoSuccessor { level: 0, .. }));
}

#[rstest]
fn bootstrap_uses_dump_timestamp(store: ChangesetStore, listed_feed: StubReplicationSource) {
    let dump = dump_xml(&[ChangesetXml::closed(1)]);
    let sequence = bootstrap_initial_sequence(&store, &listed_feed, dump.as_bytes())
        .expect("bootstrap succeeds");

    assert_eq!(sequence, seq(5_912_344));
    assert_eq!(
        store.replication_state().expect("state").last_sequence,
        Some(seq(5_912_344))
    );
}

#[rstest]
fn discovery_counts_group_whose_diff_lands_on_target(listed_feed: StubReplicationSource) {
    let feed = listed_feed.with_listing(
        "005/912/",
        "<a href=\"344.state.txt\">344.state.txt</a>  2024-03-01 00:00  52\n\
         <a href=\"344.osm.gz\">344.osm.gz</a>  2024-03-01 00:01  1K\n\
         <a href=\"345.osm.gz\">345.osm.gz</a>  2024-03-01 00:02  1K\n",
    );
    let target = Utc.with_ymd_and_hms(2024, 3, 1, 0, 1, 0).unwrap();
    let sequence = SequenceDiscovery::new(&feed)
        .discover(target)
        .expect("sequence discovered");
    assert_eq!(sequence, seq(5_912_344));
}
