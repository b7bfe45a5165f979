//! Local vs. remote file state comparison.

use crate::record::FileRecord;
use std::collections::{BTreeSet, HashMap};

/// Three disjoint sets of work derived from a local and a remote file set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Comparison {
    /// Local records with no remote counterpart, or a different hash.
    pub to_upload: Vec<FileRecord>,
    /// Local records already published, carrying what the remote side observed.
    pub unchanged: Vec<FileRecord>,
    /// Remote records with no local counterpart.
    pub to_delete: Vec<FileRecord>,
}

/// Compare a local file set against the remote one.
///
/// Paths are matched on [`FileRecord::key`], so `a.txt` and `/A.txt` are the
/// same file; output records keep their original case. If the remote set
/// holds several records for one key, the first one wins.
///
/// When either side of a match has no content hash the file counts as
/// unchanged. This is conservative, not correct: divergence can't be proven,
/// so real content drift may go unnoticed until a hash becomes available.
///
/// ```
/// use pubsite_deploy::{FileRecord, ContentHasher, compare};
///
/// let local = vec![FileRecord::new("/a.txt", 1).with_hash(ContentHasher::hash(b"X"))];
/// let remote = vec![FileRecord::new("/A.txt", 1).with_hash(ContentHasher::hash(b"Y"))];
/// assert_eq!(compare(&local, &remote).to_upload.len(), 1);
/// ```
pub fn compare(local: &[FileRecord], remote: &[FileRecord]) -> Comparison {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(remote.len());
    for (position, record) in remote.iter().enumerate() {
        index.entry(record.key()).or_insert(position);
    }

    let mut comparison = Comparison::default();
    let mut matched = BTreeSet::new();
    for record in local {
        let Some(&position) = index.get(&record.key()) else {
            comparison.to_upload.push(record.clone());
            continue;
        };
        matched.insert(position);
        let existing = &remote[position];
        match (record.content_hash(), existing.content_hash()) {
            (Some(ours), Some(theirs)) if ours != theirs => comparison.to_upload.push(record.clone()),
            _ => comparison.unchanged.push(record.clone().observed_as(existing)),
        }
    }

    comparison.to_delete = index
        .into_values()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|position| !matched.contains(position))
        .map(|position| remote[position].clone())
        .collect();
    tracing::debug!(
        upload = comparison.to_upload.len(),
        unchanged = comparison.unchanged.len(),
        delete = comparison.to_delete.len(),
        "Compared local and remote files"
    );
    comparison
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContentHasher;
    use rstest::rstest;

    fn record(path: &str, content: &str) -> FileRecord {
        FileRecord::new(path, content.len() as u64).with_hash(ContentHasher::hash(content.as_bytes()))
    }

    fn paths(records: &[FileRecord]) -> Vec<&str> {
        records.iter().map(|r| r.path.as_str()).collect()
    }

    #[test]
    fn test_end_to_end_scenario() {
        let local = vec![record("/index.html", "h1"), record("/a.css", "h2")];
        let remote = vec![record("/a.css", "h2"), record("/old.js", "h3")];
        let comparison = compare(&local, &remote);
        assert_eq!(paths(&comparison.to_upload), vec!["/index.html"]);
        assert_eq!(paths(&comparison.unchanged), vec!["/a.css"]);
        assert_eq!(paths(&comparison.to_delete), vec!["/old.js"]);
    }

    #[rstest]
    #[case("X", "Y", 1, 0)]
    #[case("X", "X", 0, 1)]
    fn test_hash_sensitivity(#[case] ours: &str, #[case] theirs: &str, #[case] upload: usize, #[case] unchanged: usize) {
        let comparison = compare(&[record("/a.txt", ours)], &[record("/a.txt", theirs)]);
        assert_eq!(comparison.to_upload.len(), upload);
        assert_eq!(comparison.unchanged.len(), unchanged);
        assert!(comparison.to_delete.is_empty());
    }

    #[rstest]
    #[case("a.txt", "/A.txt")]
    #[case("//a.txt", "/a.txt")]
    #[case("/Dir/File.HTML", "/dir/file.html")]
    fn test_case_and_slash_normalization(#[case] local: &str, #[case] remote: &str) {
        let comparison = compare(&[record(local, "X")], &[record(remote, "X")]);
        assert_eq!(comparison.unchanged.len(), 1);
        assert!(comparison.to_delete.is_empty());
        // Original case is preserved on output.
        assert_eq!(comparison.unchanged[0].path, FileRecord::new(local, 0).path);
    }

    #[test]
    fn test_missing_hash_counts_as_unchanged() {
        let unhashed = FileRecord::new("/a.txt", 1);
        assert_eq!(compare(&[record("/a.txt", "X")], std::slice::from_ref(&unhashed)).unchanged.len(), 1);
        assert_eq!(compare(&[unhashed], &[record("/a.txt", "X")]).unchanged.len(), 1);
    }

    #[rstest]
    #[case("X")]
    #[case("different")]
    fn test_purge_exclusivity(#[case] remote_content: &str) {
        let local = vec![record("/keep.html", "X")];
        let remote = vec![record("/keep.html", remote_content), record("/gone.html", "Z")];
        let comparison = compare(&local, &remote);
        assert_eq!(paths(&comparison.to_delete), vec!["/gone.html"]);
    }

    #[test]
    fn test_idempotence() {
        let local = vec![record("/index.html", "h1"), record("/a.css", "h2")];
        let first = compare(&local, &[]);
        assert_eq!(first.to_upload.len(), 2);
        // The next run sees what the first one published.
        let second = compare(&local, &first.to_upload);
        assert!(second.to_upload.is_empty());
        assert_eq!(second.unchanged.len(), 2);
        assert!(second.to_delete.is_empty());
    }

    #[test]
    fn test_duplicate_remote_keys_first_wins() {
        let remote = vec![record("/a.txt", "X"), record("/A.txt", "Y")];
        let comparison = compare(&[record("/a.txt", "X")], &remote);
        assert_eq!(comparison.unchanged.len(), 1);
        // The shadowed duplicate is dropped from consideration entirely.
        assert!(comparison.to_delete.is_empty());
    }

    #[test]
    fn test_unchanged_carries_remote_observations() {
        let mut remote = record("/a.txt", "X").with_remote_event("ev1");
        remote.found_on_event_endpoints.insert("relay".to_string());
        let comparison = compare(&[record("/a.txt", "X")], &[remote]);
        assert_eq!(comparison.unchanged[0].remote_event_id.as_deref(), Some("ev1"));
        assert!(comparison.unchanged[0].found_on_event_endpoints.contains("relay"));
    }
}
