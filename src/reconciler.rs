//! The reconciliation engine.
//!
//! One run performs three phases: onboarding (labels), publishing pending
//! releases for merged release PRs, and reconciling the open release PR.
//! The last phase is retried when a concurrent edit to the PR description
//! is detected.

use log::{debug, info, warn};

use crate::changelog;
use crate::commit::Tag;
use crate::commitparser::{AnalyzedCommit, CommitParser, by_type, expand_commit_overrides};
use crate::error::{Error, Result, StateError};
use crate::forge::Forge;
use crate::releasepr::{KNOWN_LABELS, Label, ReleaseOverrides, ReleasePullRequest};
use crate::repo::ReleaseRepo;
use crate::updater::{ReleaseInfo, Updater};
use crate::versioning::{SemVer, bump_from_commits};

const PULL_REQUEST_CONFLICT_ATTEMPTS: usize = 3;

/// The branch the release commit is pushed to for `target_branch`.
pub fn release_branch(target_branch: &str) -> String {
    format!("releaser-pleaser--branches--{target_branch}")
}

/// Drives a repository towards its next release.
pub struct Reconciler {
    forge: Box<dyn Forge>,
    target_branch: String,
    commit_parser: Box<dyn CommitParser + Send + Sync>,
    versioning: SemVer,
    updaters: Vec<Box<dyn Updater>>,
}

impl Reconciler {
    /// Wire up a reconciler for one repository and target branch.
    pub fn new(
        forge: Box<dyn Forge>,
        target_branch: impl Into<String>,
        commit_parser: Box<dyn CommitParser + Send + Sync>,
        versioning: SemVer,
        updaters: Vec<Box<dyn Updater>>,
    ) -> Self {
        Self {
            forge,
            target_branch: target_branch.into(),
            commit_parser,
            versioning,
            updaters,
        }
    }

    /// Run one full reconciliation.
    pub async fn run(&self) -> Result<()> {
        self.run_onboarding().await?;
        self.run_create_pending_releases().await?;
        self.run_reconcile_release_pr_with_retries().await?;
        Ok(())
    }

    async fn run_onboarding(&self) -> Result<()> {
        self.forge.ensure_labels_exist(&KNOWN_LABELS).await
    }

    async fn run_create_pending_releases(&self) -> Result<()> {
        info!("checking for pending releases");
        let prs = self.forge.pending_releases(Label::ReleasePending).await?;

        if prs.is_empty() {
            info!("no pending releases found");
            return Ok(());
        }

        info!("found pending releases: length={}", prs.len());
        for pr in &prs {
            self.create_pending_release(pr).await?;
        }

        Ok(())
    }

    async fn create_pending_release(&self, pr: &ReleasePullRequest) -> Result<()> {
        let release_commit =
            pr.release_commit
                .as_ref()
                .ok_or(StateError::MissingReleaseCommit { id: pr.pr.id })?;

        info!(
            "creating release: pr.id={} pr.title={} commit.hash={}",
            pr.pr.id, pr.pr.title, release_commit.hash
        );

        let version = pr.version()?;
        let changelog_text = pr.changelog_text();

        debug!("creating release on forge");
        self.forge
            .create_release(
                release_commit,
                &version,
                &changelog_text,
                self.versioning.is_prerelease(&version),
                true,
            )
            .await?;

        debug!("updating pr labels");
        self.forge
            .set_pull_request_labels(pr, &[Label::ReleasePending], &[Label::ReleaseTagged])
            .await?;

        info!(
            "created release: release.title={version} release.url={}",
            self.forge.release_url(&version)
        );

        Ok(())
    }

    async fn run_reconcile_release_pr_with_retries(&self) -> Result<()> {
        let mut result = Ok(());

        for attempt in 1..=PULL_REQUEST_CONFLICT_ATTEMPTS {
            debug!(
                "attempting to reconcile release pull request: attempt={attempt} totalAttempts={PULL_REQUEST_CONFLICT_ATTEMPTS}"
            );

            result = self.run_reconcile_release_pr().await;
            match &result {
                Err(Error::PullRequestConflict) => {
                    warn!(
                        "detected conflict while updating pull request description, retrying: attempt={attempt}"
                    );
                }
                _ => break,
            }
        }

        result
    }

    async fn run_reconcile_release_pr(&self) -> Result<()> {
        let rp_branch = release_branch(&self.target_branch);

        let pr = self.forge.pull_request_for_branch(&rp_branch).await?;

        let mut overrides = ReleaseOverrides::default();
        if let Some(pr) = &pr {
            info!(
                "found existing release pull request: pr.id={} pr.title={}",
                pr.pr.id, pr.pr.title
            );
            overrides = pr.get_overrides();
        }

        let releases = self.forge.latest_tags().await?;
        match &releases.latest {
            Some(latest) => {
                info!(
                    "found latest tag: tag.hash={} tag.name={}",
                    latest.hash, latest.name
                );
                if let Some(stable) = &releases.stable {
                    if stable.hash != latest.hash {
                        info!(
                            "found stable tag: tag.hash={} tag.name={}",
                            stable.hash, stable.name
                        );
                    }
                }
            }
            None => info!("no latest tag found"),
        }

        // Stable releases consider everything since the last stable release
        // for both version and changelog. Pre-releases derive the version
        // from the last stable release but only list what is new since the
        // latest tag in the changelog.
        let commits_for_versioning = self
            .analyzed_commits_since(releases.stable.as_ref())
            .await?;

        if commits_for_versioning.is_empty() {
            if let Some(pr) = &pr {
                info!(
                    "closing existing pull request, no commits available: pr.id={} pr.title={}",
                    pr.pr.id, pr.pr.title
                );
                self.forge.close_pull_request(pr).await?;
            } else {
                info!("no commits available for release");
            }
            return Ok(());
        }

        let bump = bump_from_commits(&commits_for_versioning);
        let next_version =
            self.versioning
                .next_version(&releases, bump, overrides.next_version_type)?;
        info!("next version: version={next_version}");

        let commits_for_changelog = if overrides.next_version_type.is_prerelease()
            && releases.latest != releases.stable
        {
            self.analyzed_commits_since(releases.latest.as_ref())
                .await?
        } else {
            commits_for_versioning
        };

        debug!("cloning repository: clone.url={}", self.forge.clone_url());
        let repo = ReleaseRepo::clone(
            &self.forge.clone_url(),
            &self.target_branch,
            self.forge.git_auth(),
        )?;

        repo.delete_branch(&rp_branch)?;
        repo.checkout(&rp_branch)?;

        let changelog_data = changelog::Data::new(
            by_type(&commits_for_changelog),
            next_version.clone(),
            self.forge.release_url(&next_version),
            overrides.prefix.clone(),
            overrides.suffix.clone(),
        );

        let changelog_entry = changelog::entry(&changelog_data, changelog::Formatting::default())?;

        let release_info = ReleaseInfo {
            version: next_version.clone(),
            changelog_entry,
        };

        for updater in &self.updaters {
            for file in updater.files() {
                repo.update_file(
                    &file,
                    updater.create_missing(),
                    &[updater.as_ref()],
                    &release_info,
                )?;
            }
        }

        let author = self.forge.commit_author().await?;
        let message = format!("chore({}): release {next_version}", self.target_branch);
        let release_commit = repo.commit(&message, &author)?;
        info!(
            "created release commit: commit.hash={} commit.message={}",
            release_commit.hash, release_commit.message
        );

        if repo.has_changes_with_remote(&self.target_branch, &rp_branch)? {
            repo.force_push(&rp_branch)?;
            info!(
                "pushed branch: commit.hash={} branch.name={rp_branch}",
                release_commit.hash
            );
        } else {
            info!("file content is already up-to-date in remote branch, skipping push");
        }

        // The PR body gets the entry without the version heading, the
        // version is already in the PR title.
        let pr_changelog_entry = changelog::entry(
            &changelog_data,
            changelog::Formatting {
                hide_version_title: true,
            },
        )?;

        match pr {
            None => {
                let mut new_pr = ReleasePullRequest::new(
                    rp_branch,
                    &self.target_branch,
                    &next_version,
                    &pr_changelog_entry,
                )?;
                self.forge.create_pull_request(&mut new_pr).await?;
                info!(
                    "opened pull request: pr.title={} pr.id={} pr.url={}",
                    new_pr.pr.title,
                    new_pr.pr.id,
                    self.forge.pull_request_url(new_pr.pr.id)
                );
            }
            Some(mut pr) => {
                // The user may have edited the description while this run
                // was underway. Re-read it and bail out instead of
                // reverting their changes. A small window between this
                // check and the update remains.
                debug!("checking for conflict in pr description: pr.id={}", pr.pr.id);
                let recheck = self.forge.pull_request_for_branch(&rp_branch).await?;
                let Some(recheck) = recheck else {
                    return Err(StateError::PullRequestDeleted.into());
                };
                if recheck.pr.description != pr.pr.description {
                    return Err(Error::PullRequestConflict);
                }

                pr.set_title(&self.target_branch, &next_version);
                let overrides = pr.get_overrides();
                pr.set_description(&pr_changelog_entry, &overrides)?;

                self.forge.update_pull_request(&pr).await?;
                info!(
                    "updated pull request: pr.title={} pr.id={} pr.url={}",
                    pr.pr.title,
                    pr.pr.id,
                    self.forge.pull_request_url(pr.pr.id)
                );
            }
        }

        Ok(())
    }

    async fn analyzed_commits_since(&self, since: Option<&Tag>) -> Result<Vec<AnalyzedCommit>> {
        if let Some(tag) = since {
            debug!(
                "collecting commits: tag.hash={} tag.name={}",
                tag.hash, tag.name
            );
        }

        let commits = self.forge.commits_since(since).await?;
        let commits = expand_commit_overrides(commits);
        info!("found releasable commits: length={}", commits.len());

        let analyzed = self.commit_parser.analyze(&commits)?;
        info!("analyzed commits: length={}", analyzed.len());

        Ok(analyzed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_branch_name_is_deterministic() {
        assert_eq!(release_branch("main"), "releaser-pleaser--branches--main");
        assert_eq!(
            release_branch("release-1.x"),
            "releaser-pleaser--branches--release-1.x"
        );
    }
}
