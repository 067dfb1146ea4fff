//! Shared fixtures: a local bare repository standing in for the forge's
//! git hosting, and an in-memory forge implementation on top of it.

// Each test binary only exercises part of the fixture surface.
#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use git2::{Oid, Repository, Signature};
use tempfile::TempDir;

use releaser_pleaser::commit::{Commit, PullRequest, Releases, Tag};
use releaser_pleaser::error::Result;
use releaser_pleaser::forge::{CommitAuthor, Forge, GitAuth};
use releaser_pleaser::releasepr::{Label, ReleasePullRequest};

/// A bare repository standing in for the forge-hosted remote.
pub struct RemoteRepo {
    dir: TempDir,
}

impl RemoteRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        repo.reference_symbolic("HEAD", "refs/heads/main", true, "set default branch")
            .unwrap();
        Self { dir }
    }

    fn open(&self) -> Repository {
        Repository::open(self.dir.path()).unwrap()
    }

    pub fn clone_url(&self) -> String {
        self.dir.path().to_str().unwrap().to_string()
    }

    /// Commit `files` on main and return the commit hash.
    pub fn commit_on_main(&self, message: &str, files: &[(&str, &str)]) -> String {
        let repo = self.open();

        let parent_id = repo.refname_to_id("refs/heads/main").ok();
        let parent = parent_id.map(|id| repo.find_commit(id).unwrap());

        let base_tree = parent.as_ref().map(|commit| commit.tree().unwrap());
        let mut builder = repo.treebuilder(base_tree.as_ref()).unwrap();
        for (path, content) in files {
            let blob = repo.blob(content.as_bytes()).unwrap();
            builder.insert(path, blob, 0o100644).unwrap();
        }
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();

        let signature = Signature::now("dev", "dev@example.com").unwrap();
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = repo
            .commit(
                Some("refs/heads/main"),
                &signature,
                &signature,
                message,
                &tree,
                &parents,
            )
            .unwrap();

        oid.to_string()
    }

    pub fn tag(&self, name: &str, hash: &str) {
        let repo = self.open();
        let object = repo
            .find_object(Oid::from_str(hash).unwrap(), None)
            .unwrap();
        repo.tag_lightweight(name, &object, false).unwrap();
    }

    pub fn main_head(&self) -> String {
        self.open()
            .refname_to_id("refs/heads/main")
            .unwrap()
            .to_string()
    }

    pub fn branch_head(&self, branch: &str) -> Option<String> {
        self.open()
            .refname_to_id(&format!("refs/heads/{branch}"))
            .ok()
            .map(|oid| oid.to_string())
    }

    /// Read a file from the tip of `branch`.
    pub fn file_content(&self, branch: &str, path: &str) -> Option<String> {
        let repo = self.open();
        let commit_id = repo.refname_to_id(&format!("refs/heads/{branch}")).ok()?;
        let tree = repo.find_commit(commit_id).ok()?.tree().ok()?;
        let entry = tree.get_path(Path::new(path)).ok()?;
        let blob = repo.find_blob(entry.id()).ok()?;
        Some(String::from_utf8_lossy(blob.content()).into_owned())
    }

    pub fn commit_author_of(&self, branch: &str) -> (String, String) {
        let repo = self.open();
        let commit_id = repo
            .refname_to_id(&format!("refs/heads/{branch}"))
            .unwrap();
        let commit = repo.find_commit(commit_id).unwrap();
        let author = commit.author();
        let committer = commit.committer();
        (
            author.name().unwrap_or_default().to_string(),
            committer.name().unwrap_or_default().to_string(),
        )
    }

    /// Commits on main after `since` (newest first), like a forge would
    /// report them.
    pub fn commits_since(&self, since: Option<&str>) -> Vec<(String, String)> {
        let repo = self.open();
        let mut walk = repo.revwalk().unwrap();
        walk.push_ref("refs/heads/main").unwrap();
        if let Some(hash) = since {
            walk.hide(Oid::from_str(hash).unwrap()).unwrap();
        }

        walk.map(|id| {
            let commit = repo.find_commit(id.unwrap()).unwrap();
            (
                commit.id().to_string(),
                commit.message().unwrap_or_default().to_string(),
            )
        })
        .collect()
    }
}

/// A release recorded by [`FakeForge::create_release`].
#[derive(Debug, Clone)]
pub struct CreatedRelease {
    pub commit: String,
    pub title: String,
    pub changelog: String,
    pub prerelease: bool,
    pub latest: bool,
}

#[derive(Default)]
pub struct ForgeState {
    /// Tags in creation order, newest last
    pub tags: Vec<Tag>,
    pub labels: Vec<String>,
    pub open_pr: Option<ReleasePullRequest>,
    pub closed_prs: Vec<ReleasePullRequest>,
    /// Merged PRs, still carrying whatever labels they were left with
    pub merged_prs: Vec<ReleasePullRequest>,
    pub releases: Vec<CreatedRelease>,
    /// PR associated with a commit hash, for override tests
    pub commit_prs: Vec<(String, PullRequest)>,
    pub next_pr_id: u64,
    pub update_calls: usize,
    /// Applied to the open PR after the next `pull_request_for_branch`
    /// read, simulating a user editing the description mid-run
    pub description_edit_after_next_read: Option<String>,
}

/// An in-memory forge over a [`RemoteRepo`]. Clones share their state, so
/// tests can keep a handle while the reconciler owns another.
#[derive(Clone)]
pub struct FakeForge {
    pub remote: Arc<RemoteRepo>,
    pub state: Arc<Mutex<ForgeState>>,
}

impl FakeForge {
    pub fn new(remote: RemoteRepo) -> Self {
        Self {
            remote: Arc::new(remote),
            state: Arc::new(Mutex::new(ForgeState {
                next_pr_id: 1,
                ..ForgeState::default()
            })),
        }
    }

    pub fn add_tag(&self, name: &str, hash: &str) {
        self.remote.tag(name, hash);
        self.state.lock().unwrap().tags.push(Tag {
            hash: hash.to_string(),
            name: name.to_string(),
        });
    }

    pub fn attach_pr_to_commit(&self, hash: &str, pr: PullRequest) {
        self.state
            .lock()
            .unwrap()
            .commit_prs
            .push((hash.to_string(), pr));
    }
}

#[async_trait]
impl Forge for FakeForge {
    fn repo_url(&self) -> String {
        "https://forge.example/example/project".to_string()
    }

    fn clone_url(&self) -> String {
        self.remote.clone_url()
    }

    fn release_url(&self, version: &str) -> String {
        format!("{}/releases/{version}", self.repo_url())
    }

    fn pull_request_url(&self, id: u64) -> String {
        format!("{}/pulls/{id}", self.repo_url())
    }

    fn git_auth(&self) -> Option<GitAuth> {
        None
    }

    async fn commit_author(&self) -> Result<CommitAuthor> {
        Ok(CommitAuthor {
            name: "forge-user".to_string(),
            email: "forge-user@example.com".to_string(),
        })
    }

    async fn latest_tags(&self) -> Result<Releases> {
        let state = self.state.lock().unwrap();
        let mut releases = Releases::default();

        for tag in state.tags.iter().rev() {
            let raw = tag.name.strip_prefix('v').unwrap_or(&tag.name);
            let Ok(version) = semver::Version::parse(raw) else {
                continue;
            };
            if releases.latest.is_none() {
                releases.latest = Some(tag.clone());
            }
            if version.pre.is_empty() {
                releases.stable = Some(tag.clone());
                break;
            }
        }

        Ok(releases)
    }

    async fn commits_since(&self, since: Option<&Tag>) -> Result<Vec<Commit>> {
        let raw = self.remote.commits_since(since.map(|tag| tag.hash.as_str()));
        let state = self.state.lock().unwrap();

        Ok(raw
            .into_iter()
            .map(|(hash, message)| {
                let pull_request = state
                    .commit_prs
                    .iter()
                    .find(|(commit_hash, _)| *commit_hash == hash)
                    .map(|(_, pr)| pr.clone());
                Commit {
                    hash,
                    message,
                    pull_request,
                }
            })
            .collect())
    }

    async fn ensure_labels_exist(&self, labels: &[Label]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for label in labels {
            if !state.labels.iter().any(|name| name == label.name()) {
                state.labels.push(label.name().to_string());
            }
        }
        Ok(())
    }

    async fn pull_request_for_branch(&self, branch: &str) -> Result<Option<ReleasePullRequest>> {
        let mut state = self.state.lock().unwrap();
        let result = state
            .open_pr
            .clone()
            .filter(|pr| pr.head == branch);

        if result.is_some() {
            if let Some(description) = state.description_edit_after_next_read.take() {
                if let Some(pr) = state.open_pr.as_mut() {
                    pr.pr.description = description;
                }
            }
        }

        Ok(result)
    }

    async fn create_pull_request(&self, pr: &mut ReleasePullRequest) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        pr.pr.id = state.next_pr_id;
        state.next_pr_id += 1;
        state.open_pr = Some(pr.clone());
        Ok(())
    }

    async fn update_pull_request(&self, pr: &ReleasePullRequest) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.update_calls += 1;
        if let Some(open) = state.open_pr.as_mut() {
            if open.pr.id == pr.pr.id {
                open.pr.title = pr.pr.title.clone();
                open.pr.description = pr.pr.description.clone();
            }
        }
        Ok(())
    }

    async fn set_pull_request_labels(
        &self,
        pr: &ReleasePullRequest,
        remove: &[Label],
        add: &[Label],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        let mut apply = |target: &mut ReleasePullRequest| {
            target.labels.retain(|label| !remove.contains(label));
            for label in add {
                if !target.labels.contains(label) {
                    target.labels.push(*label);
                }
            }
        };

        if let Some(open) = state.open_pr.as_mut() {
            if open.pr.id == pr.pr.id {
                apply(open);
            }
        }
        for merged in state.merged_prs.iter_mut() {
            if merged.pr.id == pr.pr.id {
                apply(merged);
            }
        }

        Ok(())
    }

    async fn close_pull_request(&self, pr: &ReleasePullRequest) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(open) = state.open_pr.take() {
            if open.pr.id == pr.pr.id {
                state.closed_prs.push(open);
            } else {
                state.open_pr = Some(open);
            }
        }
        Ok(())
    }

    async fn pending_releases(&self, label: Label) -> Result<Vec<ReleasePullRequest>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .merged_prs
            .iter()
            .filter(|pr| pr.labels.contains(&label))
            .cloned()
            .collect())
    }

    async fn create_release(
        &self,
        commit: &Commit,
        title: &str,
        changelog: &str,
        prerelease: bool,
        latest: bool,
    ) -> Result<()> {
        // Mirror a real forge: creating a release also creates the tag.
        self.remote.tag(title, &commit.hash);

        let mut state = self.state.lock().unwrap();
        state.tags.push(Tag {
            hash: commit.hash.clone(),
            name: title.to_string(),
        });
        state.releases.push(CreatedRelease {
            commit: commit.hash.clone(),
            title: title.to_string(),
            changelog: changelog.to_string(),
            prerelease,
            latest,
        });
        Ok(())
    }
}
