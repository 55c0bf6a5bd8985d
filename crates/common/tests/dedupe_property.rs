use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use reposync_common::record::{dedupe, OfflineRecord, MAX_PENDING};

fn timestamp(offset: usize) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + offset as i64, 0).expect("valid timestamp")
}

fn edit_strategy() -> impl Strategy<Value = (String, String)> {
    (prop::sample::select(vec!["a.txt", "b.txt", "src/lib.rs", "README.md", "c/d/e.md"]), "[a-z0-9]{0,8}")
        .prop_map(|(path, content)| (path.to_string(), content))
}

proptest! {
    #[test]
    fn dedupe_yields_one_change_per_distinct_path(edits in prop::collection::vec(edit_strategy(), 0..64)) {
        let mut record = OfflineRecord::default();
        for (i, (path, content)) in edits.iter().enumerate() {
            record.append(path.clone(), content.clone(), timestamp(i));
        }

        let mut expected: HashMap<&str, &str> = HashMap::new();
        for (path, content) in &edits {
            expected.insert(path.as_str(), content.as_str());
        }

        let changes = dedupe(&record.pending_commits);
        prop_assert_eq!(changes.len(), expected.len());

        let distinct: HashSet<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        prop_assert_eq!(distinct.len(), changes.len());

        for change in &changes {
            prop_assert_eq!(Some(&change.content.as_str()), expected.get(change.path.as_str()));
        }
    }

    #[test]
    fn cache_matches_newest_log_entry(edits in prop::collection::vec(edit_strategy(), 1..64)) {
        let mut record = OfflineRecord::default();
        for (i, (path, content)) in edits.iter().enumerate() {
            record.append(path.clone(), content.clone(), timestamp(i));
        }

        for change in dedupe(&record.pending_commits) {
            prop_assert_eq!(record.cached(&change.path), Some(change.content.as_str()));
        }
    }
}

#[test]
fn bound_keeps_the_most_recent_entries() {
    let mut record = OfflineRecord::default();
    for i in 0..=MAX_PENDING {
        record.append(format!("file-{i}"), format!("v{i}"), timestamp(i));
    }

    assert_eq!(record.pending_commits.len(), MAX_PENDING);
    let first = &record.pending_commits[0];
    assert_eq!(first.path, "file-1");
    let last = record.pending_commits.last().expect("log should be non-empty");
    assert_eq!(last.path, format!("file-{MAX_PENDING}"));
}
