// Offline record table: whole-record rows keyed by repository id.
//
// Each row carries a `version` stamp that increases on every write. Plain
// `put` replaces unconditionally; `put_if_version` is a compare-and-swap, and
// `update_in_transaction` serializes a read-modify-write against writers on
// other connections by holding SQLite's write lock for its duration.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use reposync_common::record::OfflineRecord;

/// A record as stored, with its version stamp. Version 0 means "no row".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub record: OfflineRecord,
    pub version: i64,
}

/// Row-level operations on `offline_records`.
pub struct RecordTable<'a> {
    conn: &'a Connection,
}

impl<'a> RecordTable<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Load a record. Missing rows read as the empty record at version 0.
    pub fn get(&self, repo_id: &str) -> Result<StoredRecord> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT record, version FROM offline_records WHERE repo_id = ?1",
                params![repo_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .with_context(|| format!("failed to read offline record for `{repo_id}`"))?;

        match row {
            Some((json, version)) => Ok(StoredRecord { record: decode(repo_id, &json)?, version }),
            None => Ok(StoredRecord { record: OfflineRecord::default(), version: 0 }),
        }
    }

    /// Replace a record unconditionally. Returns the new version.
    pub fn put(&self, repo_id: &str, record: &OfflineRecord, now: DateTime<Utc>) -> Result<i64> {
        let json = encode(repo_id, record)?;
        self.conn
            .query_row(
                "INSERT INTO offline_records (repo_id, record, version, updated_at) \
                 VALUES (?1, ?2, 1, ?3) \
                 ON CONFLICT(repo_id) DO UPDATE SET \
                 record = excluded.record, \
                 version = offline_records.version + 1, \
                 updated_at = excluded.updated_at \
                 RETURNING version",
                params![repo_id, json, now.to_rfc3339()],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to write offline record for `{repo_id}`"))
    }

    /// Replace a record only if its stored version still equals `expected`.
    ///
    /// Returns `false` when another writer got there first.
    pub fn put_if_version(
        &self,
        repo_id: &str,
        record: &OfflineRecord,
        expected: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let json = encode(repo_id, record)?;
        let rows = (if expected == 0 {
            self.conn.execute(
                "INSERT INTO offline_records (repo_id, record, version, updated_at) \
                 VALUES (?1, ?2, 1, ?3) ON CONFLICT(repo_id) DO NOTHING",
                params![repo_id, json, now.to_rfc3339()],
            )
        } else {
            self.conn.execute(
                "UPDATE offline_records SET record = ?2, version = version + 1, updated_at = ?3 \
                 WHERE repo_id = ?1 AND version = ?4",
                params![repo_id, json, now.to_rfc3339(), expected],
            )
        })
        .with_context(|| format!("failed to compare-and-swap offline record for `{repo_id}`"))?;

        Ok(rows > 0)
    }

    /// Repository ids whose pending log is non-empty.
    pub fn repo_ids_with_pending(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT repo_id FROM offline_records \
                 WHERE json_array_length(record, '$.pending_commits') > 0 \
                 ORDER BY repo_id ASC",
            )
            .context("failed to prepare pending repositories query")?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("failed to query repositories with pending edits")?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to collect repositories with pending edits")
    }
}

/// Read-modify-write one record under SQLite's write lock.
///
/// `BEGIN IMMEDIATE` takes the reserved lock up front, so a second
/// connection running the same sequence waits (up to the busy timeout)
/// instead of interleaving its read with ours.
pub fn update_in_transaction<T>(
    conn: &mut Connection,
    repo_id: &str,
    now: DateTime<Utc>,
    mutate: impl FnOnce(&mut OfflineRecord) -> T,
) -> Result<(T, OfflineRecord)> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to start offline record transaction")?;

    let (output, record) = {
        let table = RecordTable::new(&tx);
        let StoredRecord { mut record, .. } = table.get(repo_id)?;
        let output = mutate(&mut record);
        table.put(repo_id, &record, now)?;
        (output, record)
    };

    tx.commit().with_context(|| format!("failed to commit offline record for `{repo_id}`"))?;
    Ok((output, record))
}

fn encode(repo_id: &str, record: &OfflineRecord) -> Result<String> {
    serde_json::to_string(record)
        .with_context(|| format!("failed to encode offline record for `{repo_id}`"))
}

fn decode(repo_id: &str, json: &str) -> Result<OfflineRecord> {
    serde_json::from_str(json)
        .with_context(|| format!("stored offline record for `{repo_id}` is corrupt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::meta_db::MetaDb;
    use tempfile::TempDir;

    fn setup() -> (MetaDb, TempDir) {
        let dir = TempDir::new().expect("temp dir should be created");
        let db = MetaDb::open(dir.path().join("offline.db")).expect("offline db should open");
        (db, dir)
    }

    fn record_with_edit(path: &str, content: &str) -> OfflineRecord {
        let mut record = OfflineRecord::default();
        record.append(path, content, Utc::now());
        record
    }

    #[test]
    fn missing_record_reads_as_empty_version_zero() {
        let (db, _dir) = setup();
        let stored = RecordTable::new(db.connection()).get("repo-1").expect("get should succeed");
        assert_eq!(stored.record, OfflineRecord::default());
        assert_eq!(stored.version, 0);
    }

    #[test]
    fn put_then_get_round_trips_and_bumps_version() {
        let (db, _dir) = setup();
        let table = RecordTable::new(db.connection());
        let record = record_with_edit("a.txt", "1");

        assert_eq!(table.put("repo-1", &record, Utc::now()).expect("first put"), 1);
        assert_eq!(table.put("repo-1", &record, Utc::now()).expect("second put"), 2);

        let stored = table.get("repo-1").expect("get should succeed");
        assert_eq!(stored.record, record);
        assert_eq!(stored.version, 2);
    }

    #[test]
    fn put_if_version_rejects_stale_writer() {
        let (db, _dir) = setup();
        let table = RecordTable::new(db.connection());
        let now = Utc::now();

        assert!(table.put_if_version("repo-1", &record_with_edit("a.txt", "1"), 0, now).unwrap());
        // A second creator loses the race.
        assert!(!table.put_if_version("repo-1", &record_with_edit("b.txt", "2"), 0, now).unwrap());
        // Writer holding version 1 succeeds once; the stale retry fails.
        assert!(table.put_if_version("repo-1", &record_with_edit("c.txt", "3"), 1, now).unwrap());
        assert!(!table.put_if_version("repo-1", &record_with_edit("d.txt", "4"), 1, now).unwrap());

        let stored = table.get("repo-1").expect("get should succeed");
        assert_eq!(stored.version, 2);
        assert_eq!(stored.record.cached("c.txt"), Some("3"));
    }

    #[test]
    fn pending_scan_skips_records_without_edits() {
        let (db, _dir) = setup();
        let table = RecordTable::new(db.connection());
        let now = Utc::now();

        let mut cache_only = OfflineRecord::default();
        cache_only.cache("a.txt", "server");
        table.put("cache-only", &cache_only, now).expect("put cache-only");
        table.put("with-edits", &record_with_edit("a.txt", "1"), now).expect("put with-edits");

        assert_eq!(table.repo_ids_with_pending().expect("scan"), vec!["with-edits".to_string()]);
    }

    #[test]
    fn update_in_transaction_applies_mutation() {
        let dir = TempDir::new().expect("temp dir should be created");
        let mut conn =
            MetaDb::open(dir.path().join("offline.db")).expect("offline db").into_connection();

        let (dropped, record) = update_in_transaction(&mut conn, "repo-1", Utc::now(), |record| {
            record.append("a.txt", "1", Utc::now())
        })
        .expect("update should succeed");

        assert_eq!(dropped, 0);
        assert!(record.has_pending());
        let stored = RecordTable::new(&conn).get("repo-1").expect("get should succeed");
        assert_eq!(stored.record, record);
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn corrupt_row_surfaces_an_error() {
        let (db, _dir) = setup();
        db.connection()
            .execute(
                "INSERT INTO offline_records (repo_id, record, version, updated_at) \
                 VALUES ('repo-1', 'not json', 1, datetime('now'))",
                [],
            )
            .expect("raw insert should succeed");

        let error = RecordTable::new(db.connection()).get("repo-1").expect_err("decode must fail");
        assert!(error.to_string().contains("corrupt"));
    }
}
