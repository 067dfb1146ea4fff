//! Commit-message overrides declared in pull request bodies.
//!
//! A PR author can place an `rp-commits` fenced code block in the PR
//! description. Each non-blank line of the block replaces the merge commit's
//! message for versioning and changelog purposes. An empty block removes the
//! commit entirely.

use crate::commit::Commit;
use crate::markdown;

const OVERRIDE_BLOCK_LANGUAGE: &str = "rp-commits";

/// Apply PR-body overrides to every commit in the batch.
pub fn expand_commit_overrides(commits: Vec<Commit>) -> Vec<Commit> {
    commits.into_iter().flat_map(expand_single).collect()
}

fn expand_single(commit: Commit) -> Vec<Commit> {
    let Some(pr) = &commit.pull_request else {
        return vec![commit];
    };

    let Some(block) = markdown::fenced_code_block(&pr.description, OVERRIDE_BLOCK_LANGUAGE) else {
        return vec![commit];
    };

    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| Commit {
            hash: commit.hash.clone(),
            message: line.to_string(),
            pull_request: commit.pull_request.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::PullRequest;

    fn commit_with_body(message: &str, body: Option<&str>) -> Commit {
        Commit {
            hash: "1234abcd".to_string(),
            message: message.to_string(),
            pull_request: body.map(|description| PullRequest {
                id: 7,
                title: "some pr".to_string(),
                description: description.to_string(),
            }),
        }
    }

    #[test]
    fn no_pull_request_passes_through() {
        let commits = expand_commit_overrides(vec![commit_with_body("feat: original", None)]);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "feat: original");
    }

    #[test]
    fn no_block_passes_through() {
        let commits = expand_commit_overrides(vec![commit_with_body(
            "feat: original",
            Some("Just a regular description"),
        )]);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "feat: original");
    }

    #[test]
    fn block_replaces_commit_with_lines() {
        let body = "Description\n\n```rp-commits\nfeat: one\n\n  fix: two  \n```";
        let commits =
            expand_commit_overrides(vec![commit_with_body("feat: combined", Some(body))]);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].message, "feat: one");
        assert_eq!(commits[1].message, "fix: two");
        // Hash and PR are inherited
        assert_eq!(commits[0].hash, "1234abcd");
        assert!(commits[1].pull_request.is_some());
    }

    #[test]
    fn empty_block_elides_commit() {
        let body = "```rp-commits\n```";
        let commits = expand_commit_overrides(vec![commit_with_body("feat: gone", Some(body))]);
        assert!(commits.is_empty());
    }
}
