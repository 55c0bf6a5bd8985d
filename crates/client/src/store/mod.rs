// Durable record store: SQLite-backed offline records, one row per repository.
//
// All SQLite work runs on tokio's blocking pool. Every successful write emits
// an `OfflineUpdate` on the store's bus.

pub mod meta_db;
pub mod records;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use tracing::debug;

use reposync_common::record::OfflineRecord;

use crate::bus::UpdateBus;

use self::meta_db::MetaDb;
use self::records::{update_in_transaction, RecordTable, StoredRecord};

/// Async handle to the offline record database.
///
/// Cloning shares the same connection. Other contexts open their own
/// `OfflineStore` on the same file.
#[derive(Debug, Clone)]
pub struct OfflineStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    bus: UpdateBus,
}

impl OfflineStore {
    /// Open (and migrate) the database at `path`, publishing to the
    /// process-wide bus.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_bus(path, UpdateBus::global().clone())
    }

    pub fn open_with_bus(path: impl AsRef<Path>, bus: UpdateBus) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = MetaDb::open(&path)?.into_connection();
        Ok(Self { conn: Arc::new(Mutex::new(conn)), path, bus })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bus(&self) -> &UpdateBus {
        &self.bus
    }

    /// Read a record; an absent record reads as empty.
    pub async fn read(&self, repo_id: &str) -> Result<OfflineRecord> {
        Ok(self.read_versioned(repo_id).await?.record)
    }

    pub async fn read_versioned(&self, repo_id: &str) -> Result<StoredRecord> {
        let repo_id = repo_id.to_string();
        self.blocking(move |conn| RecordTable::new(conn).get(&repo_id)).await
    }

    /// Replace a record wholesale.
    pub async fn write(&self, repo_id: &str, record: OfflineRecord) -> Result<()> {
        let owned_id = repo_id.to_string();
        let version = self
            .blocking(move |conn| RecordTable::new(conn).put(&owned_id, &record, Utc::now()))
            .await?;
        debug!(repo_id, version, "offline record written");
        self.bus.emit(Some(repo_id));
        Ok(())
    }

    /// Replace a record only if it is still at `expected` version.
    pub async fn write_if_version(
        &self,
        repo_id: &str,
        record: OfflineRecord,
        expected: i64,
    ) -> Result<bool> {
        let owned_id = repo_id.to_string();
        let written = self
            .blocking(move |conn| {
                RecordTable::new(conn).put_if_version(&owned_id, &record, expected, Utc::now())
            })
            .await?;
        if written {
            self.bus.emit(Some(repo_id));
        }
        Ok(written)
    }

    /// Atomic read-modify-write of one record. Returns the closure's output.
    pub async fn update<T, F>(&self, repo_id: &str, mutate: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut OfflineRecord) -> T + Send + 'static,
    {
        let owned_id = repo_id.to_string();
        let (output, _record) = self
            .blocking(move |conn| update_in_transaction(conn, &owned_id, Utc::now(), mutate))
            .await?;
        self.bus.emit(Some(repo_id));
        Ok(output)
    }

    /// Repositories with a non-empty pending log, in unspecified order.
    pub async fn repo_ids_with_pending(&self) -> Result<Vec<String>> {
        self.blocking(|conn| RecordTable::new(conn).repo_ids_with_pending()).await
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard =
                conn.lock().map_err(|_| anyhow!("offline store connection lock poisoned"))?;
            work(&mut guard)
        })
        .await
        .context("offline store task failed to complete")?
    }
}
