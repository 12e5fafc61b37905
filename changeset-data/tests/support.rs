use camino::Utf8PathBuf;
use changeset_data::ChangesetStore;

/// Directory containing the dump fixtures.
pub fn fixtures_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// In-memory store with the schema applied.
pub fn fresh_store() -> ChangesetStore {
    let mut store = ChangesetStore::open_in_memory()
        .unwrap_or_else(|err| panic!("failed to open in-memory store: {err}"));
    store
        .initialise()
        .unwrap_or_else(|err| panic!("failed to initialise schema: {err}"));
    store
}

/// Stored changeset ids in ascending order.
pub fn stored_ids(store: &ChangesetStore) -> Vec<i64> {
    let mut statement = store
        .connection()
        .prepare("SELECT id FROM osm_changeset ORDER BY id")
        .unwrap_or_else(|err| panic!("failed to prepare id query: {err}"));
    statement
        .query_map([], |row| row.get(0))
        .and_then(|rows| rows.collect::<Result<Vec<i64>, _>>())
        .unwrap_or_else(|err| panic!("failed to read ids: {err}"))
}

/// Row count of `table`.
pub fn row_count(store: &ChangesetStore, table: &str) -> i64 {
    store
        .connection()
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap_or_else(|err| panic!("failed to count rows in {table}: {err}"))
}
