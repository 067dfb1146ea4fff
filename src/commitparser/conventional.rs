//! Conventional-commits parser.

use std::sync::OnceLock;

use log::warn;
use regex::Regex;

use crate::commit::Commit;
use crate::commitparser::{AnalyzedCommit, CommitParser};
use crate::error::Result;

const KNOWN_TYPES: &[&str] = &[
    "build", "chore", "ci", "docs", "feat", "fix", "perf", "refactor", "revert", "style", "test",
];

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        // type(scope)!: description, scope and ! optional
        Regex::new(r"^(?P<type>[a-z]+)(?:\((?P<scope>[^)]*)\))?(?P<bang>!)?:\s+(?P<desc>.+)$")
            .expect("conventional commit header regex is valid")
    })
}

/// Best-effort parser for the `type(scope)!: description` grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConventionalCommits;

impl CommitParser for ConventionalCommits {
    fn analyze(&self, commits: &[Commit]) -> Result<Vec<AnalyzedCommit>> {
        let mut analyzed = Vec::with_capacity(commits.len());

        for commit in commits {
            let message = commit.message.trim();
            let Some(parsed) = parse_message(message) else {
                warn!(
                    "failed to parse message of commit, skipping: commit.hash={}",
                    commit.hash
                );
                continue;
            };

            // Only releasable commits matter for version and changelog.
            if !parsed.breaking && parsed.commit_type != "feat" && parsed.commit_type != "fix" {
                continue;
            }

            analyzed.push(AnalyzedCommit {
                commit: commit.clone(),
                commit_type: parsed.commit_type,
                description: parsed.description,
                scope: parsed.scope,
                breaking: parsed.breaking,
            });
        }

        Ok(analyzed)
    }
}

struct ParsedMessage {
    commit_type: String,
    description: String,
    scope: Option<String>,
    breaking: bool,
}

fn parse_message(message: &str) -> Option<ParsedMessage> {
    let header = message.lines().next()?;
    let captures = header_regex().captures(header)?;

    let commit_type = captures.name("type")?.as_str();
    if !KNOWN_TYPES.contains(&commit_type) {
        return None;
    }

    let scope = captures
        .name("scope")
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty());

    let breaking = captures.name("bang").is_some() || has_breaking_footer(message);

    Some(ParsedMessage {
        commit_type: commit_type.to_string(),
        description: captures.name("desc")?.as_str().trim().to_string(),
        scope,
        breaking,
    })
}

fn has_breaking_footer(message: &str) -> bool {
    message
        .lines()
        .skip(1)
        .any(|line| line.starts_with("BREAKING CHANGE:") || line.starts_with("BREAKING-CHANGE:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(message: &str) -> Commit {
        Commit {
            hash: "f3b9c2".to_string(),
            message: message.to_string(),
            pull_request: None,
        }
    }

    fn analyze(messages: &[&str]) -> Vec<AnalyzedCommit> {
        let commits: Vec<Commit> = messages.iter().map(|m| commit(m)).collect();
        ConventionalCommits.analyze(&commits).unwrap()
    }

    #[test]
    fn parses_type_and_description() {
        let result = analyze(&["feat: add frobnicator"]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].commit_type, "feat");
        assert_eq!(result[0].description, "add frobnicator");
        assert_eq!(result[0].scope, None);
        assert!(!result[0].breaking);
    }

    #[test]
    fn parses_scope() {
        let result = analyze(&["fix(api): handle empty response"]);
        assert_eq!(result[0].scope.as_deref(), Some("api"));
    }

    #[test]
    fn bang_marks_breaking() {
        let result = analyze(&["feat!: drop legacy endpoint"]);
        assert!(result[0].breaking);

        let result = analyze(&["feat(api)!: drop legacy endpoint"]);
        assert!(result[0].breaking);
        assert_eq!(result[0].scope.as_deref(), Some("api"));
    }

    #[test]
    fn footer_marks_breaking() {
        let result = analyze(&["fix: change defaults\n\nBREAKING CHANGE: defaults differ"]);
        assert!(result[0].breaking);
    }

    #[test]
    fn breaking_chore_is_kept() {
        let result = analyze(&["chore!: drop support for v1 config"]);
        assert_eq!(result.len(), 1);
        assert!(result[0].breaking);
    }

    #[test]
    fn non_releasable_types_are_dropped() {
        assert!(analyze(&["chore: bump deps", "docs: fix typo", "ci: new runner"]).is_empty());
    }

    #[test]
    fn malformed_messages_are_skipped_not_fatal() {
        let result = analyze(&["not a conventional message", "feat: still works"]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].description, "still works");
    }

    #[test]
    fn unknown_type_is_skipped() {
        assert!(analyze(&["yolo: whatever"]).is_empty());
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let result = analyze(&["\n  feat: trimmed\n"]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].description, "trimmed");
    }
}
