//! Local working copy used to build the release branch.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Cred, DiffFormat, ErrorCode, FetchOptions, PushOptions, RemoteCallbacks,
    Repository, Signature,
};
use log::debug;
use tempfile::TempDir;

use crate::commit::Commit;
use crate::error::{GitError, Result, UpdaterError};
use crate::forge::{CommitAuthor, GitAuth};
use crate::updater::{ReleaseInfo, Updater};

const REMOTE_NAME: &str = "origin";
const BOT_NAME: &str = "releaser-pleaser";
const BOT_EMAIL: &str = "releaser-pleaser@users.noreply.github.com";

/// A clone of the repository in a temporary directory.
///
/// The directory is removed when the value is dropped.
pub struct ReleaseRepo {
    repo: Repository,
    auth: Option<GitAuth>,
    _dir: TempDir,
}

impl ReleaseRepo {
    /// Clone all branches of `clone_url` and check out `target_branch`.
    pub fn clone(clone_url: &str, target_branch: &str, auth: Option<GitAuth>) -> Result<Self> {
        let dir = TempDir::with_prefix("releaser-pleaser.")?;
        debug!(
            "cloning repository: clone.url={clone_url} dir={}",
            dir.path().display()
        );

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(remote_callbacks(auth.clone()));

        let mut builder = RepoBuilder::new();
        builder.branch(target_branch);
        builder.fetch_options(fetch_options);
        let repo = builder
            .clone(clone_url, dir.path())
            .map_err(GitError::Internal)?;

        Ok(Self {
            repo,
            auth,
            _dir: dir,
        })
    }

    /// Delete the local branch `name`. Succeeds when the branch is absent.
    pub fn delete_branch(&self, name: &str) -> Result<()> {
        match self.repo.find_branch(name, BranchType::Local) {
            Ok(mut branch) => {
                debug!("deleting local branch: branch.name={name}");
                branch.delete().map_err(GitError::Internal)?;
                Ok(())
            }
            Err(err) if err.code() == ErrorCode::NotFound => Ok(()),
            Err(err) => Err(GitError::Internal(err).into()),
        }
    }

    /// Switch to branch `name`, creating it from the current HEAD when it
    /// does not exist.
    pub fn checkout(&self, name: &str) -> Result<()> {
        if self.repo.find_branch(name, BranchType::Local).is_err() {
            let head = self
                .repo
                .head()
                .and_then(|head| head.peel_to_commit())
                .map_err(GitError::Internal)?;
            self.repo.branch(name, &head, false).map_err(GitError::Internal)?;
        }

        self.repo
            .set_head(&format!("refs/heads/{name}"))
            .map_err(GitError::Internal)?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))
            .map_err(GitError::Internal)?;

        Ok(())
    }

    /// Apply `updaters` to `path` in order and stage the result.
    ///
    /// Missing files fail with [`UpdaterError::MissingFile`] unless `create`
    /// is set.
    pub fn update_file(
        &self,
        path: &Path,
        create: bool,
        updaters: &[&dyn Updater],
        info: &ReleaseInfo,
    ) -> Result<()> {
        let workdir = self.repo.workdir().ok_or(GitError::MissingWorkdir)?;
        let absolute = workdir.join(path);

        let content = match fs::read_to_string(&absolute) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if !create {
                    return Err(UpdaterError::MissingFile {
                        path: path.to_path_buf(),
                    }
                    .into());
                }
                String::new()
            }
            Err(err) => return Err(err.into()),
        };

        let mut updated = content;
        for updater in updaters {
            updated = updater.apply(&updated, info)?;
        }

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&absolute, &updated)?;

        let mut index = self.repo.index().map_err(GitError::Internal)?;
        index.add_path(path).map_err(GitError::Internal)?;
        index.write().map_err(GitError::Internal)?;

        Ok(())
    }

    /// Commit all staged changes on the current branch.
    ///
    /// The commit is authored by `author` and committed by the fixed bot
    /// identity.
    pub fn commit(&self, message: &str, author: &CommitAuthor) -> Result<Commit> {
        let mut index = self.repo.index().map_err(GitError::Internal)?;
        let tree_id = index.write_tree().map_err(GitError::Internal)?;
        let tree = self.repo.find_tree(tree_id).map_err(GitError::Internal)?;
        let parent = self
            .repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(GitError::Internal)?;

        let author_signature =
            Signature::now(&author.name, &author.email).map_err(GitError::Internal)?;
        let committer = Signature::now(BOT_NAME, BOT_EMAIL).map_err(GitError::Internal)?;

        let oid = self
            .repo
            .commit(
                Some("HEAD"),
                &author_signature,
                &committer,
                message,
                &tree,
                &[&parent],
            )
            .map_err(GitError::Internal)?;

        Ok(Commit {
            hash: oid.to_string(),
            message: message.to_string(),
            pull_request: None,
        })
    }

    /// Whether pushing the local `pr_branch` would change anything on the
    /// remote beyond a plain rebase onto the current `main_branch`.
    ///
    /// Both sides are reduced to "what does this branch change on top of the
    /// current main": the remote branch is diffed against its merge-base
    /// with the remote main, the local branch against the remote main
    /// directly. When the two patches are textually identical a push would
    /// only rebase the branch and waste CI cycles.
    pub fn has_changes_with_remote(&self, main_branch: &str, pr_branch: &str) -> Result<bool> {
        let remote_main = self
            .find_remote_commit(main_branch)?
            .ok_or_else(|| GitError::BranchNotFound {
                name: format!("{REMOTE_NAME}/{main_branch}"),
            })?;

        let Some(remote_pr) = self.find_remote_commit(pr_branch)? else {
            // No remote branch yet, the push is always needed.
            return Ok(true);
        };

        let local_pr = self
            .repo
            .find_branch(pr_branch, BranchType::Local)
            .and_then(|branch| branch.get().peel_to_commit())
            .map_err(GitError::Internal)?;

        let merge_base = match self.repo.merge_base(remote_main.id(), remote_pr.id()) {
            Ok(oid) => self.repo.find_commit(oid).map_err(GitError::Internal)?,
            Err(err) if err.code() == ErrorCode::NotFound => return Ok(false),
            Err(err) => return Err(GitError::Internal(err).into()),
        };

        let remote_patch = self.patch_text(&merge_base, &remote_pr)?;
        let local_patch = self.patch_text(&remote_main, &local_pr)?;

        Ok(remote_patch != local_patch)
    }

    /// Force-push `branch` to origin.
    pub fn force_push(&self, branch: &str) -> Result<()> {
        let mut remote = self
            .repo
            .find_remote(REMOTE_NAME)
            .map_err(GitError::Internal)?;

        let refspec = format!("+refs/heads/{branch}:refs/heads/{branch}");
        debug!("pushing branch: branch.name={branch} refspec={refspec}");

        let mut push_options = PushOptions::new();
        push_options.remote_callbacks(remote_callbacks(self.auth.clone()));

        remote
            .push(&[refspec.as_str()], Some(&mut push_options))
            .map_err(GitError::Internal)?;

        Ok(())
    }

    fn find_remote_commit(&self, branch: &str) -> Result<Option<git2::Commit<'_>>> {
        match self
            .repo
            .find_branch(&format!("{REMOTE_NAME}/{branch}"), BranchType::Remote)
        {
            Ok(found) => Ok(Some(
                found
                    .get()
                    .peel_to_commit()
                    .map_err(GitError::Internal)?,
            )),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(GitError::Internal(err).into()),
        }
    }

    fn patch_text(&self, from: &git2::Commit<'_>, to: &git2::Commit<'_>) -> Result<String> {
        let from_tree = from.tree().map_err(GitError::Internal)?;
        let to_tree = to.tree().map_err(GitError::Internal)?;

        let diff = self
            .repo
            .diff_tree_to_tree(Some(&from_tree), Some(&to_tree), None)
            .map_err(GitError::Internal)?;

        let mut text = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            match line.origin() {
                '+' | '-' | ' ' => text.push(line.origin()),
                _ => {}
            }
            text.push_str(std::str::from_utf8(line.content()).unwrap_or_default());
            true
        })
        .map_err(GitError::Internal)?;

        Ok(text)
    }
}

fn remote_callbacks(auth: Option<GitAuth>) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();

    if let Some(auth) = auth {
        callbacks.credentials(move |_url, _username_from_url, _allowed| {
            Cred::userpass_plaintext(&auth.username, &auth.password)
        });
    }

    // remote.push only reports transport errors by itself, per-ref refusals
    // arrive through this callback.
    callbacks.push_update_reference(|refname, status| match status {
        Some(message) => Err(git2::Error::from_str(&format!(
            "failed to push {refname}: {message}"
        ))),
        None => Ok(()),
    });

    callbacks
}
