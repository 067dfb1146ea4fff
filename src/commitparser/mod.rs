//! Mapping commit messages to structured release-relevant data.

use std::collections::HashMap;

use crate::commit::Commit;
use crate::error::Result;

mod conventional;
mod overrides;

pub use conventional::ConventionalCommits;
pub use overrides::expand_commit_overrides;

/// A commit whose message was successfully parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedCommit {
    /// The underlying commit
    pub commit: Commit,
    /// Parsed type, e.g. `feat`
    pub commit_type: String,
    /// Parsed description
    pub description: String,
    /// Optional scope
    pub scope: Option<String>,
    /// Whether the commit declares a breaking change
    pub breaking: bool,
}

/// Turns raw commits into [`AnalyzedCommit`]s, dropping everything that does
/// not contribute to a release.
pub trait CommitParser {
    /// Analyze a batch of commits. A single malformed message never fails
    /// the batch, it is skipped with a warning.
    fn analyze(&self, commits: &[Commit]) -> Result<Vec<AnalyzedCommit>>;
}

/// Group analyzed commits by their type.
pub fn by_type(commits: &[AnalyzedCommit]) -> HashMap<String, Vec<AnalyzedCommit>> {
    let mut groups: HashMap<String, Vec<AnalyzedCommit>> = HashMap::new();
    for commit in commits {
        groups
            .entry(commit.commit_type.clone())
            .or_default()
            .push(commit.clone());
    }
    groups
}
