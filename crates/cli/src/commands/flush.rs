// `reposync flush` — send queued edits to the backend now.

use std::path::Path;

use clap::Args;
use serde::Serialize;

use reposync_client::config::ClientConfig;
use reposync_client::flush::{FlushError, FlushOptions, FlushOutcome, RepoFlushReport};

use super::{block_on, load_config, Session};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct FlushArgs {
    /// Only flush this repository (default: every repository with queued edits).
    #[arg(long)]
    repo: Option<String>,

    /// Commit message for the batch commit.
    #[arg(long)]
    message: Option<String>,

    /// Commit author name.
    #[arg(long)]
    author_name: Option<String>,

    /// Commit author email.
    #[arg(long)]
    author_email: Option<String>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

impl FlushArgs {
    fn flush_options(&self, config: &ClientConfig) -> FlushOptions {
        let mut options = config.sync.flush_options();
        if let Some(message) = &self.message {
            options.message = message.clone();
        }
        if self.author_name.is_some() {
            options.author_name = self.author_name.clone();
        }
        if self.author_email.is_some() {
            options.author_email = self.author_email.clone();
        }
        options
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FlushSummary {
    pub repos: Vec<RepoSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RepoSummary {
    pub repo_id: String,
    #[serde(flatten)]
    pub outcome: FlushOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn run(args: FlushArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = load_config(config_path).and_then(|config| {
        let options = args.flush_options(&config);
        block_on(flush(config, args.repo.clone(), options))?
    });

    let reports = match result {
        Ok(reports) => reports,
        Err(error) => {
            output::print_anyhow_error(format, &error);
            return Err(error);
        }
    };

    let (summary, first_failure) = summarize(reports);
    output::print_output(format, &summary, format_human)?;

    match first_failure {
        None => Ok(()),
        Some(failure) => {
            let failed = summary.repos.iter().filter(|repo| repo.error.is_some()).count();
            let error = anyhow::Error::new(failure)
                .context(format!("{failed} of {} repositories failed to sync", summary.repos.len()));
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

async fn flush(
    config: ClientConfig,
    repo: Option<String>,
    options: FlushOptions,
) -> anyhow::Result<Vec<RepoFlushReport>> {
    let session = Session::open(config)?;
    if !session.probe().await {
        return Err(FlushError::Offline.into());
    }

    let editor = session.editor();
    match repo {
        Some(repo_id) => {
            // A targeted flush reports its own failure as the command error.
            let outcome = editor.flush(&repo_id, &options).await?;
            Ok(vec![RepoFlushReport { repo_id, result: Ok(outcome) }])
        }
        None => editor.flush_all(&options).await,
    }
}

/// Split sweep reports into printable rows and the first failure.
fn summarize(reports: Vec<RepoFlushReport>) -> (FlushSummary, Option<FlushError>) {
    let mut first_failure = None;
    let mut repos = Vec::with_capacity(reports.len());

    for RepoFlushReport { repo_id, result } in reports {
        match result {
            Ok(outcome) => repos.push(RepoSummary { repo_id, outcome, error: None }),
            Err(error) => {
                repos.push(RepoSummary {
                    repo_id,
                    outcome: FlushOutcome::default(),
                    error: Some(error.to_string()),
                });
                first_failure.get_or_insert(error);
            }
        }
    }

    (FlushSummary { repos }, first_failure)
}

fn format_human(summary: &FlushSummary) -> String {
    if summary.repos.is_empty() {
        return "Nothing to sync.".to_string();
    }

    let mut lines = Vec::new();
    for repo in &summary.repos {
        let line = match (&repo.error, &repo.outcome) {
            (Some(error), _) => format!("✗ {}: {error}", repo.repo_id),
            (None, outcome) if !outcome.synced => format!("· {}: nothing to sync", repo.repo_id),
            (None, outcome) => {
                let how = if outcome.committed {
                    match &outcome.commit_hash {
                        Some(hash) => format!("committed {hash}"),
                        None => "committed".to_string(),
                    }
                } else {
                    "written file by file".to_string()
                };
                format!("✓ {}: {} file(s), {how}", repo.repo_id, outcome.files.len())
            }
        };
        lines.push(line);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::offline_config;
    use crate::exit_code::ExitCode;
    use reposync_client::backend::BackendError;

    fn committed(files: &[&str]) -> FlushOutcome {
        FlushOutcome {
            ok: true,
            synced: true,
            committed: true,
            files: files.iter().map(|f| f.to_string()).collect(),
            commit_hash: Some("abc123".into()),
        }
    }

    #[test]
    fn summarize_keeps_first_failure() {
        let reports = vec![
            RepoFlushReport { repo_id: "a".into(), result: Ok(committed(&["x.md"])) },
            RepoFlushReport {
                repo_id: "b".into(),
                result: Err(FlushError::Backend {
                    repo_id: "b".into(),
                    path: "y.md".into(),
                    source: BackendError::network("connection reset"),
                }),
            },
        ];
        let (summary, failure) = summarize(reports);
        assert_eq!(summary.repos.len(), 2);
        assert!(summary.repos[1].error.as_deref().unwrap().contains("`y.md`"));
        assert!(matches!(failure, Some(FlushError::Backend { .. })));

        let text = format_human(&summary);
        assert!(text.contains("✓ a: 1 file(s), committed abc123"));
        assert!(text.contains("✗ b: failed to sync `y.md` in repository `b`"));
    }

    #[test]
    fn json_flattens_outcome() {
        let summary = FlushSummary {
            repos: vec![RepoSummary { repo_id: "a".into(), outcome: committed(&["x.md"]), error: None }],
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["repos"][0]["repo_id"], "a");
        assert_eq!(value["repos"][0]["commit_hash"], "abc123");
        assert!(value["repos"][0].get("error").is_none());
    }

    #[test]
    fn human_format_for_empty_sweep() {
        assert_eq!(format_human(&FlushSummary { repos: vec![] }), "Nothing to sync.");
    }

    #[test]
    fn cli_flags_override_config() {
        let mut config = ClientConfig::default();
        config.sync.author_name = Some("Config Author".into());
        config.sync.author_email = Some("config@example.com".into());
        let args = FlushArgs {
            repo: None,
            message: Some("Manual sync".into()),
            author_name: Some("Ada".into()),
            author_email: None,
            json: false,
        };
        let options = args.flush_options(&config);
        assert_eq!(options.message, "Manual sync");
        assert_eq!(options.author_name.as_deref(), Some("Ada"));
        assert_eq!(options.author_email.as_deref(), Some("config@example.com"));
    }

    #[tokio::test]
    async fn unreachable_backend_fails_as_offline() {
        let dir = tempfile::tempdir().unwrap();
        let (config, _) = offline_config(dir.path());
        let error = flush(config, None, FlushOptions::default()).await.unwrap_err();
        assert_eq!(ExitCode::from_error(&error), ExitCode::Offline);
    }
}
