// CLI subcommand dispatch and shared setup.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;

use reposync_client::backend::{Endpoint, HttpBackend};
use reposync_client::config::ClientConfig;
use reposync_client::connectivity::Connectivity;
use reposync_client::editor::OfflineEditor;
use reposync_client::probe::probe_once;
use reposync_client::store::OfflineStore;

pub mod flush;
pub mod pending;
pub mod queue;
pub mod status;
pub mod watch;

#[derive(Subcommand)]
pub enum Command {
    /// Show connectivity and repositories with queued edits
    Status(status::StatusArgs),
    /// List queued edits for one repository
    Pending(pending::PendingArgs),
    /// Queue an edit for later sync
    Queue(queue::QueueArgs),
    /// Send queued edits to the backend now
    Flush(flush::FlushArgs),
    /// Keep syncing in the foreground until Ctrl-C
    Watch(watch::WatchArgs),
}

pub fn run(cmd: Command, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Status(args) => status::run(args, config_path),
        Command::Pending(args) => pending::run(args, config_path),
        Command::Queue(args) => queue::run(args, config_path),
        Command::Flush(args) => flush::run(args, config_path),
        Command::Watch(args) => watch::run(args, config_path),
    }
}

/// Drive a command future on a fresh runtime.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    Ok(runtime.block_on(future))
}

pub(crate) fn load_config(config_path: Option<&Path>) -> Result<ClientConfig> {
    let config = match config_path {
        Some(path) => ClientConfig::load_from(path)
            .with_context(|| format!("failed to load config from `{}`", path.display()))?
            .with_env_overrides(|key| std::env::var(key)),
        None => ClientConfig::load(),
    };
    config.validate()?;
    Ok(config)
}

/// Everything a command needs: config, store, backend and a connectivity view.
pub(crate) struct Session {
    pub config: ClientConfig,
    pub store: OfflineStore,
    pub backend: Arc<HttpBackend>,
    pub connectivity: Connectivity,
}

impl Session {
    pub fn open(config: ClientConfig) -> Result<Self> {
        let database_path = config.resolved_database_path()?;
        let store = OfflineStore::open(&database_path)?;
        let endpoint = Endpoint::new(&config.api_base_url)?;
        let backend = Arc::new(HttpBackend::new(endpoint, config.sync.request_timeout())?);
        Ok(Self { config, store, backend, connectivity: Connectivity::offline() })
    }

    /// Ping the backend once so `connectivity` reflects reality.
    pub async fn probe(&self) -> bool {
        probe_once(self.backend.as_ref(), &self.connectivity).await
    }

    pub fn editor(&self) -> OfflineEditor<HttpBackend> {
        OfflineEditor::new(self.store.clone(), Arc::clone(&self.backend), self.connectivity.clone())
    }
}
