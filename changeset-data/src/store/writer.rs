#![forbid(unsafe_code)]

use std::collections::HashSet;

use changeset_core::{BoundingBox, Changeset, Comment};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};

use super::{ChangesetStore, StoreError, sqlite_error};

/// Spatial reference identifier tagged onto stored rectangles.
pub const GEOMETRY_SRID: u32 = 4326;

const INSERT_CHANGESET: &str = "INSERT INTO osm_changeset (
        id, user_id, created_at, min_lat, max_lat, min_lon, max_lon,
        centroid_lon, centroid_lat, closed_at, open, num_changes, user_name,
        city_id, province_id, region_id, tags
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?12, ?13, ?14, ?15, ?16)";

const INSERT_CHANGESET_WITH_GEOMETRY: &str = "INSERT INTO osm_changeset (
        id, user_id, created_at, min_lat, max_lat, min_lon, max_lon,
        centroid_lon, centroid_lat, closed_at, open, num_changes, user_name,
        city_id, province_id, region_id, tags, geom
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?12, ?13, ?14, ?15, ?16, ?17)";

const INSERT_COMMENT: &str = "INSERT INTO osm_changeset_comment (
        comment_changeset_id, comment_user_id, comment_user_name, comment_date, comment_text
    ) VALUES (?1, ?2, ?3, ?4, ?5)";

/// Records buffered between flushes.
///
/// In replace mode every pushed id is scheduled for deletion before the
/// batch is inserted. A second record for an id already pending in the batch
/// supersedes the first, so one batch never inserts the same id twice.
#[derive(Debug, Clone, Default)]
pub struct ChangesetBatch {
    changesets: Vec<Changeset>,
    comments: Vec<Comment>,
    replaced: Vec<i64>,
    pending: HashSet<i64>,
}

impl ChangesetBatch {
    /// Buffer one changeset together with its comments.
    pub fn push(&mut self, changeset: Changeset, comments: Vec<Comment>, replace: bool) {
        let id = changeset.id;
        if replace {
            if self.pending.contains(&id) {
                self.changesets.retain(|pending| pending.id != id);
                self.comments.retain(|pending| pending.changeset_id != id);
            } else {
                self.replaced.push(id);
            }
        }
        self.pending.insert(id);
        self.changesets.push(changeset);
        self.comments.extend(comments);
    }

    /// Buffered changesets in arrival order.
    #[must_use]
    pub fn changesets(&self) -> &[Changeset] {
        &self.changesets
    }

    /// Buffered comments.
    #[must_use]
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Ids whose stored rows are deleted before insertion.
    #[must_use]
    pub fn replaced_ids(&self) -> &[i64] {
        &self.replaced
    }

    /// Number of buffered changesets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changesets.len()
    }

    /// Whether no changeset is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    /// Drop every buffered record, keeping allocations.
    pub fn clear(&mut self) {
        self.changesets.clear();
        self.comments.clear();
        self.replaced.clear();
        self.pending.clear();
    }
}

impl ChangesetStore {
    /// Insert changesets in one transaction.
    ///
    /// The slice must not repeat an id, and no id may already be stored.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] when an insert fails; nothing from the
    /// slice is committed in that case.
    pub fn write_changesets(&self, changesets: &[Changeset]) -> Result<(), StoreError> {
        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(sqlite_error("begin changeset transaction"))?;
        insert_changesets(&transaction, changesets, self.geometry)?;
        transaction
            .commit()
            .map_err(sqlite_error("commit changeset transaction"))
    }

    /// Insert comments in one transaction. Their parents must be stored.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] when an insert fails.
    pub fn write_comments(&self, comments: &[Comment]) -> Result<(), StoreError> {
        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(sqlite_error("begin comment transaction"))?;
        insert_comments(&transaction, comments)?;
        transaction
            .commit()
            .map_err(sqlite_error("commit comment transaction"))
    }

    /// Delete the changeset `id` and its comments, if present.
    ///
    /// # Errors
    /// Returns [`StoreError::Sqlite`] when a delete fails.
    pub fn replace_existing(&self, id: i64) -> Result<(), StoreError> {
        delete_changeset(&self.connection, id)
    }

    /// Commit a batch atomically: scheduled deletions, then changesets, then
    /// comments.
    ///
    /// # Errors
    /// Returns a [`StoreError`] when any statement fails; the whole batch is
    /// rolled back.
    pub fn write_batch(&self, batch: &ChangesetBatch) -> Result<(), StoreError> {
        let transaction = self
            .connection
            .unchecked_transaction()
            .map_err(sqlite_error("begin batch transaction"))?;
        for id in batch.replaced_ids() {
            delete_changeset(&transaction, *id)?;
        }
        insert_changesets(&transaction, batch.changesets(), self.geometry)?;
        insert_comments(&transaction, batch.comments())?;
        transaction
            .commit()
            .map_err(sqlite_error("commit batch transaction"))
    }
}

fn delete_changeset(connection: &Connection, id: i64) -> Result<(), StoreError> {
    connection
        .prepare_cached("DELETE FROM osm_changeset_comment WHERE comment_changeset_id = ?1")
        .and_then(|mut statement| statement.execute([id]))
        .map_err(sqlite_error("delete comments"))?;
    connection
        .prepare_cached("DELETE FROM osm_changeset WHERE id = ?1")
        .and_then(|mut statement| statement.execute([id]))
        .map_err(sqlite_error("delete changeset"))?;
    Ok(())
}

fn insert_changesets(
    connection: &Connection,
    changesets: &[Changeset],
    geometry: bool,
) -> Result<(), StoreError> {
    if changesets.is_empty() {
        return Ok(());
    }
    let sql = if geometry {
        INSERT_CHANGESET_WITH_GEOMETRY
    } else {
        INSERT_CHANGESET
    };
    let mut insert = connection
        .prepare_cached(sql)
        .map_err(sqlite_error("prepare insert changeset"))?;
    for changeset in changesets {
        let tags =
            serde_json::to_string(&changeset.tags).map_err(|source| StoreError::EncodeTags {
                changeset_id: changeset.id,
                source,
            })?;
        let bbox = &changeset.bbox;
        let attribution = &changeset.attribution;
        let created_at = timestamp(&changeset.created_at);
        let closed_at = timestamp(&changeset.closed_at);
        let result = if geometry {
            insert.execute(params![
                changeset.id,
                changeset.user_id,
                created_at,
                bbox.min_lat,
                bbox.max_lat,
                bbox.min_lon,
                bbox.max_lon,
                changeset.centroid.x(),
                changeset.centroid.y(),
                closed_at,
                changeset.num_changes,
                changeset.user_name,
                attribution.city_id,
                attribution.province_id,
                attribution.region_id,
                tags,
                ewkt_rectangle(bbox),
            ])
        } else {
            insert.execute(params![
                changeset.id,
                changeset.user_id,
                created_at,
                bbox.min_lat,
                bbox.max_lat,
                bbox.min_lon,
                bbox.max_lon,
                changeset.centroid.x(),
                changeset.centroid.y(),
                closed_at,
                changeset.num_changes,
                changeset.user_name,
                attribution.city_id,
                attribution.province_id,
                attribution.region_id,
                tags,
            ])
        };
        result.map_err(sqlite_error("insert changeset"))?;
    }
    Ok(())
}

fn insert_comments(connection: &Connection, comments: &[Comment]) -> Result<(), StoreError> {
    if comments.is_empty() {
        return Ok(());
    }
    let mut insert = connection
        .prepare_cached(INSERT_COMMENT)
        .map_err(sqlite_error("prepare insert comment"))?;
    for comment in comments {
        insert
            .execute(params![
                comment.changeset_id,
                comment.user_id,
                comment.user_name,
                comment.date.as_ref().map(timestamp),
                comment.text,
            ])
            .map_err(sqlite_error("insert comment"))?;
    }
    Ok(())
}

pub(crate) fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Extended WKT for the rectangle spanning `bbox`.
///
/// # Examples
/// ```
/// use changeset_core::BoundingBox;
/// use changeset_data::store::ewkt_rectangle;
///
/// let wkt = ewkt_rectangle(&BoundingBox::new(1.0, 2.0, 3.0, 4.0));
/// assert_eq!(wkt, "SRID=4326;POLYGON((1 3,2 3,2 4,1 4,1 3))");
/// ```
#[must_use]
pub fn ewkt_rectangle(bbox: &BoundingBox) -> String {
    let ring = [
        (bbox.min_lon, bbox.min_lat),
        (bbox.max_lon, bbox.min_lat),
        (bbox.max_lon, bbox.max_lat),
        (bbox.min_lon, bbox.max_lat),
        (bbox.min_lon, bbox.min_lat),
    ];
    let points = ring
        .iter()
        .map(|(lon, lat)| format!("{lon} {lat}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("SRID={GEOMETRY_SRID};POLYGON(({points}))")
}
