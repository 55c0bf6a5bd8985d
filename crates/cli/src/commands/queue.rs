// `reposync queue` — record an edit in the offline log without touching the network.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Args};
use serde::{Deserialize, Serialize};

use reposync_client::backend::HttpBackend;
use reposync_client::editor::OfflineEditor;

use super::{block_on, load_config, Session};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("source").required(true).args(["content", "from_file"])))]
pub struct QueueArgs {
    /// Repository identifier.
    repo_id: String,

    /// Path of the file inside the repository.
    path: String,

    /// New file content.
    #[arg(long)]
    content: Option<String>,

    /// Read new file content from a local file.
    #[arg(long)]
    from_file: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueResult {
    pub repo_id: String,
    pub path: String,
    pub seq: u64,
    pub pending: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dropped: usize,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

pub fn run(args: QueueArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = read_content(&args).and_then(|content| {
        let editor = Session::open(load_config(config_path)?)?.editor();
        block_on(queue_edit(&editor, args.repo_id, args.path, content))?
    });

    match result {
        Ok(queued) => {
            output::print_output(format, &queued, format_human)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

fn read_content(args: &QueueArgs) -> anyhow::Result<String> {
    match (&args.content, &args.from_file) {
        (Some(content), _) => Ok(content.clone()),
        (None, Some(file)) => std::fs::read_to_string(file)
            .with_context(|| format!("failed to read `{}`", file.display())),
        (None, None) => anyhow::bail!("either --content or --from-file is required"),
    }
}

async fn queue_edit(
    editor: &OfflineEditor<HttpBackend>,
    repo_id: String,
    path: String,
    content: String,
) -> anyhow::Result<QueueResult> {
    let path = reposync_common::path::normalize_path(&path)?;
    let queued = editor.queue_edit(&repo_id, &path, &content).await?;
    Ok(QueueResult {
        repo_id,
        path,
        seq: queued.seq,
        pending: queued.pending,
        dropped: queued.dropped,
    })
}

fn format_human(result: &QueueResult) -> String {
    let mut text = format!(
        "Queued {} in {} (#{}, {} pending)",
        result.path, result.repo_id, result.seq, result.pending
    );
    if result.dropped > 0 {
        text.push_str(&format!("\nwarning: {} oldest edit(s) discarded", result.dropped));
    }
    text
}
