// Offline record: per-repository file cache plus the bounded pending edit log.
//
// The log is append-only between flushes. Every append also updates the cache,
// so for any path in the log `files[path]` is the newest logged content.
// Entries carry a monotonically increasing `seq` so a flush can acknowledge
// exactly the entries it sent, leaving edits queued in the meantime intact.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on pending edits kept per repository. Oldest entries are
/// discarded first.
pub const MAX_PENDING: usize = 500;

/// One offline write awaiting server application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub seq: u64,
    pub path: String,
    pub new_content: String,
    pub timestamp: DateTime<Utc>,
}

/// Net change for a single path after collapsing the pending log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupedChange {
    pub path: String,
    pub content: String,
}

/// Durable offline state for one repository.
///
/// A missing record is equivalent to `OfflineRecord::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineRecord {
    pub files: BTreeMap<String, String>,
    pub pending_commits: Vec<PendingEdit>,
    pub next_seq: u64,
}

impl OfflineRecord {
    pub fn cached(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Update the cache without touching the log.
    pub fn cache(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_commits.is_empty()
    }

    /// Append an edit and mirror it into the cache.
    ///
    /// Returns how many of the oldest entries were dropped to stay within
    /// [`MAX_PENDING`].
    pub fn append(
        &mut self,
        path: impl Into<String>,
        new_content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> usize {
        let path = path.into();
        let new_content = new_content.into();

        let seq = self.next_seq;
        self.next_seq += 1;
        self.files.insert(path.clone(), new_content.clone());
        self.pending_commits.push(PendingEdit { seq, path, new_content, timestamp });

        let overflow = self.pending_commits.len().saturating_sub(MAX_PENDING);
        if overflow > 0 {
            self.pending_commits.drain(..overflow);
        }
        overflow
    }

    /// Highest sequence number currently in the log.
    pub fn last_seq(&self) -> Option<u64> {
        self.pending_commits.iter().map(|edit| edit.seq).max()
    }

    /// Remove every entry with `seq <= through`. Returns the number removed.
    pub fn acknowledge_through(&mut self, through: u64) -> usize {
        let before = self.pending_commits.len();
        self.pending_commits.retain(|edit| edit.seq > through);
        before - self.pending_commits.len()
    }

    /// Newest queued content for `path`, if an edit to it is still pending.
    pub fn latest_pending(&self, path: &str) -> Option<&str> {
        self.pending_commits
            .iter()
            .rev()
            .find(|edit| edit.path == path)
            .map(|edit| edit.new_content.as_str())
    }

    /// Record that `content` reached the server for `path` outside a flush.
    ///
    /// Queued edits to `path` with `seq < before_seq` are superseded and
    /// dropped. The cache takes `content` unless a newer edit is still queued.
    /// Returns the number of entries dropped.
    pub fn settle(&mut self, path: &str, content: impl Into<String>, before_seq: u64) -> usize {
        let before = self.pending_commits.len();
        self.pending_commits.retain(|edit| edit.path != path || edit.seq >= before_seq);
        if self.latest_pending(path).is_none() {
            self.files.insert(path.to_string(), content.into());
        }
        before - self.pending_commits.len()
    }
}

/// Collapse a pending log into one change per path, last entry wins.
///
/// Output follows first-seen path order; callers must not rely on it.
pub fn dedupe(pending: &[PendingEdit]) -> Vec<DedupedChange> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut changes: Vec<DedupedChange> = Vec::new();

    for edit in pending {
        match index.get(edit.path.as_str()) {
            Some(&slot) => changes[slot].content.clone_from(&edit.new_content),
            None => {
                index.insert(edit.path.as_str(), changes.len());
                changes.push(DedupedChange {
                    path: edit.path.clone(),
                    content: edit.new_content.clone(),
                });
            }
        }
    }

    changes
}
