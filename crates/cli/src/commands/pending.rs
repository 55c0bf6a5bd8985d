// `reposync pending` — list the queued edits for one repository.

use std::path::Path;

use chrono::{DateTime, Utc};
use clap::Args;
use serde::{Deserialize, Serialize};

use reposync_client::store::OfflineStore;
use reposync_common::record::dedupe;

use super::{block_on, load_config};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct PendingArgs {
    /// Repository identifier.
    repo_id: String,

    /// Show the net change per file instead of every queued edit.
    #[arg(long)]
    deduped: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingListing {
    pub repo_id: String,
    pub entries: Vec<PendingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub path: String,
    pub bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<DateTime<Utc>>,
}

pub fn run(args: PendingArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = load_config(config_path).and_then(|config| {
        let store = OfflineStore::open(config.resolved_database_path()?)?;
        block_on(list_pending(store, args.repo_id, args.deduped))?
    });

    match result {
        Ok(listing) => {
            output::print_output(format, &listing, format_human)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

async fn list_pending(
    store: OfflineStore,
    repo_id: String,
    deduped: bool,
) -> anyhow::Result<PendingListing> {
    let record = store.read(&repo_id).await?;
    let entries = if deduped {
        dedupe(&record.pending_commits)
            .into_iter()
            .map(|change| PendingEntry {
                seq: None,
                path: change.path,
                bytes: change.content.len(),
                queued_at: None,
            })
            .collect()
    } else {
        record
            .pending_commits
            .into_iter()
            .map(|edit| PendingEntry {
                seq: Some(edit.seq),
                path: edit.path,
                bytes: edit.new_content.len(),
                queued_at: Some(edit.timestamp),
            })
            .collect()
    };
    Ok(PendingListing { repo_id, entries })
}

fn format_human(listing: &PendingListing) -> String {
    if listing.entries.is_empty() {
        return format!("No queued edits for {}.", listing.repo_id);
    }

    let mut lines = vec![format!("{} queued edit(s) for {}:", listing.entries.len(), listing.repo_id)];
    for entry in &listing.entries {
        let mut line = match entry.seq {
            Some(seq) => format!("  #{seq:<4} {}", entry.path),
            None => format!("  {}", entry.path),
        };
        line.push_str(&format!("  ({} bytes)", entry.bytes));
        if let Some(queued_at) = entry.queued_at {
            line.push_str(&format!("  {}", queued_at.format("%Y-%m-%d %H:%M:%S")));
        }
        lines.push(line);
    }
    lines.join("\n")
}
