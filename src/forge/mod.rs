//! The forge contract and its adapters.
//!
//! The reconciliation engine only ever talks to [`Forge`]; the concrete
//! adapters translate it onto the REST APIs of GitHub, GitLab and Forgejo.

use async_trait::async_trait;

use crate::commit::{Commit, Releases, Tag};
use crate::error::Result;
use crate::releasepr::{Label, ReleasePullRequest};

mod forgejo;
mod github;
mod gitlab;

pub use forgejo::{Forgejo, ForgejoOptions};
pub use github::{GitHub, GitHubOptions};
pub use gitlab::{GitLab, GitLabOptions};

/// Page size used by all adapters.
pub(crate) const PER_PAGE: usize = 100;

/// Basic-auth credentials for git-over-HTTP operations.
#[derive(Debug, Clone)]
pub struct GitAuth {
    /// Username, any non-blank value for token auth
    pub username: String,
    /// Password or API token
    pub password: String,
}

/// Author identity for release commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    /// Author name
    pub name: String,
    /// Author email
    pub email: String,
}

/// A hosted code collaboration platform.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Web URL of the repository.
    fn repo_url(&self) -> String;

    /// HTTPS clone URL of the repository.
    fn clone_url(&self) -> String;

    /// Web URL of the release page for `version`.
    fn release_url(&self, version: &str) -> String;

    /// Web URL of the pull/merge request `id`.
    fn pull_request_url(&self, id: u64) -> String;

    /// Credentials for cloning and pushing. `None` when unauthenticated.
    fn git_auth(&self) -> Option<GitAuth>;

    /// The identity release commits are authored with.
    async fn commit_author(&self) -> Result<CommitAuthor>;

    /// The latest SemVer tag and the latest stable SemVer tag.
    /// Both are absent on a repository without valid tags.
    async fn latest_tags(&self) -> Result<Releases>;

    /// Commits on the target branch since `since`, or the whole branch
    /// history when `since` is absent. Each commit carries its associated
    /// merge/squash pull request when one exists.
    async fn commits_since(&self, since: Option<&Tag>) -> Result<Vec<Commit>>;

    /// Create every label in `labels` that does not exist yet.
    async fn ensure_labels_exist(&self, labels: &[Label]) -> Result<()>;

    /// The open pull request from `branch` onto the target branch, if any.
    async fn pull_request_for_branch(&self, branch: &str)
    -> Result<Option<ReleasePullRequest>>;

    /// Open a pull request. The forge-assigned id is written back into `pr`.
    async fn create_pull_request(&self, pr: &mut ReleasePullRequest) -> Result<()>;

    /// Update title and description of an existing pull request.
    async fn update_pull_request(&self, pr: &ReleasePullRequest) -> Result<()>;

    /// Remove and add labels on a pull request, in that order.
    async fn set_pull_request_labels(
        &self,
        pr: &ReleasePullRequest,
        remove: &[Label],
        add: &[Label],
    ) -> Result<()>;

    /// Close a pull request without merging.
    async fn close_pull_request(&self, pr: &ReleasePullRequest) -> Result<()>;

    /// Merged pull requests on the target branch still carrying `label`.
    async fn pending_releases(&self, label: Label) -> Result<Vec<ReleasePullRequest>>;

    /// Publish a release pointing at `commit`.
    async fn create_release(
        &self,
        commit: &Commit,
        title: &str,
        changelog: &str,
        prerelease: bool,
        latest: bool,
    ) -> Result<()>;
}

/// Turn a non-success response into a [`ForgeError::Api`].
pub(crate) async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_else(|_| String::new());
    Err(crate::error::ForgeError::Api { status, message }.into())
}

/// Feed one tag (newest first) into the release scan. Returns `true` once
/// the latest stable tag was found and scanning can stop.
pub(crate) fn observe_tag(releases: &mut Releases, tag: Tag) -> bool {
    let raw = tag.name.strip_prefix('v').unwrap_or(&tag.name);
    let version = match semver::Version::parse(raw) {
        Ok(version) => version,
        Err(err) => {
            log::warn!(
                "unable to parse tag as semver, skipping: tag.name={} tag.hash={} error={err}",
                tag.name,
                tag.hash
            );
            return false;
        }
    };

    if releases.latest.is_none() {
        releases.latest = Some(tag.clone());
    }
    if version.pre.is_empty() {
        releases.stable = Some(tag);
        return true;
    }

    false
}
