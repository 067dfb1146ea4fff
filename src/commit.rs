//! Read-only reflections of forge and repository state.

/// A commit on the target branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Full object hash
    pub hash: String,
    /// Full commit message
    pub message: String,
    /// The pull/merge request that produced this commit, if any
    pub pull_request: Option<PullRequest>,
}

impl Commit {
    /// Commit with only a hash, used for merge commits reported by the forge.
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            message: String::new(),
            pull_request: None,
        }
    }
}

/// A pull/merge request on the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Forge-assigned identifier (PR number / MR iid)
    pub id: u64,
    /// Title
    pub title: String,
    /// Body text
    pub description: String,
}

/// A lightweight or annotated tag. Annotation semantics are irrelevant here,
/// tags are always referenced by hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Hash of the tagged commit
    pub hash: String,
    /// Tag name, e.g. `v1.2.3`
    pub name: String,
}

/// The most recent release tags of the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Releases {
    /// Most recent SemVer-valid tag, stable or pre-release
    pub latest: Option<Tag>,
    /// Most recent tag without a pre-release segment
    pub stable: Option<Tag>,
}
