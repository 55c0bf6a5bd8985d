// Shared fixtures for client integration tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use reposync_client::backend::{Backend, BackendError};
use reposync_client::bus::UpdateBus;
use reposync_client::store::OfflineStore;
use reposync_common::protocol::backend::{FileBody, OfflineCommitRequest, OfflineCommitResponse};
use tokio::sync::Notify;

#[derive(Default)]
pub struct MockState {
    pub commits: Vec<(String, OfflineCommitRequest)>,
    pub puts: Vec<(String, FileBody)>,
    pub gets: Vec<(String, String)>,
    pub pings: usize,

    /// Repositories whose commit call fails with a network error.
    pub failing_commits: HashSet<String>,
    pub fail_all_commits: bool,
    /// Commit calls answer `{ ok: false }`.
    pub commits_not_ok: bool,
    /// Repositories whose per-file writes fail with a network error.
    pub failing_puts: HashSet<String>,
    /// Error returned by every PUT when set.
    pub put_error: Option<BackendError>,
    /// Error returned by every GET when set.
    pub get_error: Option<BackendError>,
    pub remote_files: HashMap<(String, String), String>,
    pub unreachable: bool,
}

/// In-memory backend that records every call.
#[derive(Clone, Default)]
pub struct MockBackend {
    pub state: Arc<Mutex<MockState>>,
    /// When set, `offline_commit` signals `commit_started` and waits for
    /// `release_commit` before answering.
    pub gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> (Self, Arc<Notify>, Arc<Notify>) {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let backend = Self {
            state: Arc::default(),
            gate: Some((Arc::clone(&started), Arc::clone(&release))),
        };
        (backend, started, release)
    }

    pub fn with_state(self, configure: impl FnOnce(&mut MockState)) -> Self {
        configure(&mut self.state.lock().expect("mock state lock"));
        self
    }

    pub fn configure(&self, configure: impl FnOnce(&mut MockState)) {
        configure(&mut self.state.lock().expect("mock state lock"));
    }

    pub fn commits(&self) -> Vec<(String, OfflineCommitRequest)> {
        self.state.lock().expect("mock state lock").commits.clone()
    }

    pub fn puts(&self) -> Vec<(String, FileBody)> {
        self.state.lock().expect("mock state lock").puts.clone()
    }

    pub fn network_calls(&self) -> usize {
        let state = self.state.lock().expect("mock state lock");
        state.commits.len() + state.puts.len() + state.gets.len()
    }
}

impl Backend for MockBackend {
    async fn put_file(&self, repo_id: &str, body: &FileBody) -> Result<(), BackendError> {
        let mut state = self.state.lock().expect("mock state lock");
        state.puts.push((repo_id.to_string(), body.clone()));
        if let Some(error) = &state.put_error {
            return Err(error.clone());
        }
        if state.failing_puts.contains(repo_id) {
            return Err(BackendError::network("connection refused"));
        }
        state.remote_files.insert((repo_id.to_string(), body.path.clone()), body.content.clone());
        Ok(())
    }

    async fn offline_commit(
        &self,
        repo_id: &str,
        request: &OfflineCommitRequest,
    ) -> Result<OfflineCommitResponse, BackendError> {
        if let Some((started, release)) = &self.gate {
            started.notify_one();
            release.notified().await;
        }

        let mut state = self.state.lock().expect("mock state lock");
        state.commits.push((repo_id.to_string(), request.clone()));
        if state.fail_all_commits || state.failing_commits.contains(repo_id) {
            return Err(BackendError::network("connection reset"));
        }
        if state.commits_not_ok {
            return Ok(OfflineCommitResponse { ok: false, commit_hash: None });
        }
        for change in &request.changes {
            state
                .remote_files
                .insert((repo_id.to_string(), change.path.clone()), change.content.clone());
        }
        Ok(OfflineCommitResponse { ok: true, commit_hash: Some("abc1234".into()) })
    }

    async fn get_file(&self, repo_id: &str, path: &str) -> Result<FileBody, BackendError> {
        let mut state = self.state.lock().expect("mock state lock");
        state.gets.push((repo_id.to_string(), path.to_string()));
        if let Some(error) = &state.get_error {
            return Err(error.clone());
        }
        match state.remote_files.get(&(repo_id.to_string(), path.to_string())) {
            Some(content) => Ok(FileBody { path: path.to_string(), content: content.clone() }),
            None => Err(BackendError::Status { status: 404, body: "not found".into() }),
        }
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock().expect("mock state lock");
        state.pings += 1;
        if state.unreachable {
            Err(BackendError::network("connection refused"))
        } else {
            Ok(())
        }
    }
}

pub fn open_store(dir: &Path) -> OfflineStore {
    OfflineStore::open_with_bus(dir.join("offline.db"), UpdateBus::new())
        .expect("offline store should open")
}
