// Status banner shown while offline or while queued edits are syncing.

use crate::trigger::SyncActivity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncBanner {
    Offline { pending_repos: usize },
    Syncing,
    Failed { error: String },
    Pending { pending_repos: usize },
}

impl SyncBanner {
    /// Pick the banner for the current state, or `None` when there is
    /// nothing to report.
    pub fn render(online: bool, activity: &SyncActivity, pending_repos: usize) -> Option<Self> {
        if !online {
            return Some(Self::Offline { pending_repos });
        }
        if activity.syncing {
            return Some(Self::Syncing);
        }
        if let Some(error) = &activity.last_error {
            return Some(Self::Failed { error: error.clone() });
        }
        if pending_repos > 0 {
            return Some(Self::Pending { pending_repos });
        }
        None
    }

    /// Short style hint for front ends.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offline { .. } => "offline",
            Self::Syncing => "syncing",
            Self::Failed { .. } => "error",
            Self::Pending { .. } => "pending",
        }
    }
}

impl std::fmt::Display for SyncBanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline { pending_repos: 0 } => write!(f, "Offline Mode"),
            Self::Offline { pending_repos } => {
                write!(f, "Offline Mode — {pending_repos} {} waiting to sync", repos(*pending_repos))
            }
            Self::Syncing => write!(f, "Syncing offline edits…"),
            Self::Failed { error } => write!(f, "Sync failed: {error}"),
            Self::Pending { pending_repos } => {
                write!(f, "Pending offline changes in {pending_repos} {}", repos(*pending_repos))
            }
        }
    }
}

fn repos(count: usize) -> &'static str {
    if count == 1 {
        "repo"
    } else {
        "repos"
    }
}
