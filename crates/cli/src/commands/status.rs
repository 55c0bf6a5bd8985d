// `reposync status` — connectivity, backend address and repositories with queued edits.

use std::path::Path;

use clap::Args;
use serde::{Deserialize, Serialize};

use reposync_client::status::SyncBanner;
use reposync_client::trigger::SyncActivity;

use super::{block_on, load_config, Session};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Skip the backend ping and report offline.
    #[arg(long)]
    no_probe: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub online: bool,
    pub api_base_url: String,
    pub database_path: String,
    pub repos: Vec<RepoPending>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoPending {
    pub repo_id: String,
    pub pending: usize,
    pub paths: usize,
}

pub fn run(args: StatusArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = load_config(config_path)
        .and_then(|config| block_on(collect_status(config, !args.no_probe))?);

    match result {
        Ok(report) => {
            output::print_output(format, &report, format_human)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

async fn collect_status(
    config: reposync_client::config::ClientConfig,
    probe: bool,
) -> anyhow::Result<StatusReport> {
    let session = Session::open(config)?;
    let online = if probe { session.probe().await } else { false };

    let mut repos = Vec::new();
    for repo_id in session.store.repo_ids_with_pending().await? {
        let record = session.store.read(&repo_id).await?;
        let paths = reposync_common::record::dedupe(&record.pending_commits).len();
        repos.push(RepoPending { repo_id, pending: record.pending_commits.len(), paths });
    }

    let banner = SyncBanner::render(online, &SyncActivity::default(), repos.len())
        .map(|banner| banner.to_string());

    Ok(StatusReport {
        online,
        api_base_url: session.config.api_base_url.clone(),
        database_path: session.store.path().display().to_string(),
        repos,
        banner,
    })
}

fn format_human(report: &StatusReport) -> String {
    let mut lines = vec![format!(
        "Backend: {} ({})",
        report.api_base_url,
        if report.online { "online" } else { "offline" }
    )];
    lines.push(format!("Database: {}", report.database_path));

    if report.repos.is_empty() {
        lines.push("No queued edits.".to_string());
    } else {
        lines.push(String::new());
        for repo in &report.repos {
            lines.push(format!(
                "  {}  {} edit(s) across {} file(s)",
                repo.repo_id, repo.pending, repo.paths
            ));
        }
    }

    if let Some(banner) = &report.banner {
        lines.push(String::new());
        lines.push(banner.clone());
    }
    lines.join("\n")
}
