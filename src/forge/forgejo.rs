//! Forgejo adapter, speaking the Gitea-style `/api/v1` REST API.

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{StatusCode, header};
use serde::{Deserialize, Serialize};

use crate::commit::{Commit, PullRequest, Releases, Tag};
use crate::error::{ForgeError, Result};
use crate::forge::{CommitAuthor, Forge, GitAuth, PER_PAGE, check_response, observe_tag};
use crate::releasepr::{Label, ReleasePullRequest};

const USER_AGENT: &str = "releaser-pleaser";

/// Connection settings for [`Forgejo`].
#[derive(Debug, Clone, Default)]
pub struct ForgejoOptions {
    /// Instance base URL, e.g. `https://codeberg.org`
    pub base_url: String,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Branch releases are cut from
    pub base_branch: String,
    /// API token
    pub api_token: Option<String>,
    /// Username for git-over-HTTP
    pub username: Option<String>,
}

/// Forge implementation for Forgejo instances.
pub struct Forgejo {
    options: ForgejoOptions,
    client: reqwest::Client,
}

impl Forgejo {
    /// Build a client for the configured instance.
    pub fn new(options: ForgejoOptions) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = &options.api_token {
            let mut value: header::HeaderValue = format!("token {token}")
                .parse()
                .map_err(|_| ForgeError::MissingCredentials {
                    reason: "api token contains invalid characters".to_string(),
                })?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(ForgeError::Http)?;

        Ok(Self { options, client })
    }

    fn api(&self, path: &str) -> String {
        format!(
            "{}/api/v1/repos/{}/{}{path}",
            self.options.base_url.trim_end_matches('/'),
            self.options.owner,
            self.options.repo
        )
    }

    async fn pr_for_commit(&self, hash: &str) -> Result<Option<PullRequest>> {
        debug!("fetching pull request associated with commit: commit.hash={hash}");
        let response = self
            .client
            .get(self.api(&format!("/commits/{hash}/pull")))
            .send()
            .await
            .map_err(ForgeError::Http)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let pr: ForgejoPull = check_response(response)
            .await?
            .json()
            .await
            .map_err(ForgeError::Http)?;

        // Only count the PR when this commit is its squash/merge result.
        if pr.merge_commit_sha.as_deref() != Some(hash) {
            return Ok(None);
        }

        Ok(Some(pr.into_pull_request()))
    }

    async fn label_ids(&self, labels: &[Label]) -> Result<Vec<u64>> {
        let repo_labels = self.list_labels().await?;
        Ok(labels
            .iter()
            .filter_map(|label| {
                repo_labels
                    .iter()
                    .find(|repo_label| repo_label.name == label.name())
                    .map(|repo_label| repo_label.id)
            })
            .collect())
    }

    async fn list_labels(&self) -> Result<Vec<ForgejoLabel>> {
        let mut labels = Vec::new();
        let mut page: usize = 1;
        loop {
            let response = self
                .client
                .get(self.api("/labels"))
                .query(&[("limit", PER_PAGE), ("page", page)])
                .send()
                .await
                .map_err(ForgeError::Http)?;
            let page_labels: Vec<ForgejoLabel> = check_response(response)
                .await?
                .json()
                .await
                .map_err(ForgeError::Http)?;
            let page_len = page_labels.len();
            labels.extend(page_labels);
            if page_len < PER_PAGE {
                return Ok(labels);
            }
            page += 1;
        }
    }

    async fn list_pulls(&self, state: &str) -> Result<Vec<ForgejoPull>> {
        let mut pulls = Vec::new();
        let mut page: usize = 1;
        loop {
            let limit = PER_PAGE.to_string();
            let page_str = page.to_string();
            let response = self
                .client
                .get(self.api("/pulls"))
                .query(&[
                    ("state", state),
                    ("limit", limit.as_str()),
                    ("page", page_str.as_str()),
                ])
                .send()
                .await
                .map_err(ForgeError::Http)?;
            let page_pulls: Vec<ForgejoPull> = check_response(response)
                .await?
                .json()
                .await
                .map_err(ForgeError::Http)?;
            let page_len = page_pulls.len();
            pulls.extend(page_pulls);
            if page_len < PER_PAGE {
                return Ok(pulls);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl Forge for Forgejo {
    fn repo_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.options.base_url.trim_end_matches('/'),
            self.options.owner,
            self.options.repo
        )
    }

    fn clone_url(&self) -> String {
        format!("{}.git", self.repo_url())
    }

    fn release_url(&self, version: &str) -> String {
        format!("{}/releases/tag/{version}", self.repo_url())
    }

    fn pull_request_url(&self, id: u64) -> String {
        format!("{}/pulls/{id}", self.repo_url())
    }

    fn git_auth(&self) -> Option<GitAuth> {
        Some(GitAuth {
            username: self.options.username.clone()?,
            password: self.options.api_token.clone()?,
        })
    }

    async fn commit_author(&self) -> Result<CommitAuthor> {
        debug!("getting commit author from current token user");
        let url = format!(
            "{}/api/v1/user",
            self.options.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ForgeError::Http)?;
        let user: ForgejoUser = check_response(response)
            .await?
            .json()
            .await
            .map_err(ForgeError::Http)?;

        let name = if user.full_name.is_empty() {
            user.login
        } else {
            user.full_name
        };

        Ok(CommitAuthor {
            name,
            email: user.email,
        })
    }

    async fn latest_tags(&self) -> Result<Releases> {
        debug!("listing all tags in forgejo repository");

        let mut releases = Releases::default();
        let mut page: usize = 1;

        'pages: loop {
            let response = self
                .client
                .get(self.api("/tags"))
                .query(&[("limit", PER_PAGE), ("page", page)])
                .send()
                .await
                .map_err(ForgeError::Http)?;
            let tags: Vec<ForgejoTag> = check_response(response)
                .await?
                .json()
                .await
                .map_err(ForgeError::Http)?;
            let page_len = tags.len();

            for fj_tag in tags {
                let tag = Tag {
                    hash: fj_tag.commit.sha,
                    name: fj_tag.name,
                };
                if observe_tag(&mut releases, tag) {
                    break 'pages;
                }
            }

            if page_len < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(releases)
    }

    async fn commits_since(&self, since: Option<&Tag>) -> Result<Vec<Commit>> {
        let head = &self.options.base_branch;

        let fj_commits: Vec<ForgejoCommit> = match since {
            Some(tag) => {
                debug!("comparing commits: base={} head={head}", tag.hash);
                let response = self
                    .client
                    .get(self.api(&format!("/compare/{}...{head}", tag.hash)))
                    .send()
                    .await
                    .map_err(ForgeError::Http)?;
                let comparison: ForgejoComparison = check_response(response)
                    .await?
                    .json()
                    .await
                    .map_err(ForgeError::Http)?;
                comparison.commits
            }
            None => {
                debug!("listing all commits: head={head}");
                let mut commits = Vec::new();
                let mut page: usize = 1;
                loop {
                    let limit = PER_PAGE.to_string();
                    let page_str = page.to_string();
                    let response = self
                        .client
                        .get(self.api("/commits"))
                        .query(&[
                            ("sha", head.as_str()),
                            ("limit", limit.as_str()),
                            ("page", page_str.as_str()),
                        ])
                        .send()
                        .await
                        .map_err(ForgeError::Http)?;
                    let page_commits: Vec<ForgejoCommit> = check_response(response)
                        .await?
                        .json()
                        .await
                        .map_err(ForgeError::Http)?;
                    let page_len = page_commits.len();
                    commits.extend(page_commits);
                    if page_len < PER_PAGE {
                        break;
                    }
                    page += 1;
                }
                commits
            }
        };

        let mut commits = Vec::with_capacity(fj_commits.len());
        for fj_commit in fj_commits {
            let pull_request = self.pr_for_commit(&fj_commit.sha).await?;
            commits.push(Commit {
                hash: fj_commit.sha,
                message: fj_commit.commit.message,
                pull_request,
            });
        }

        Ok(commits)
    }

    async fn ensure_labels_exist(&self, labels: &[Label]) -> Result<()> {
        let existing = self.list_labels().await?;

        for label in labels {
            if existing.iter().any(|l| l.name == label.name()) {
                continue;
            }
            info!("creating label in repository: label.name={}", label.name());
            let response = self
                .client
                .post(self.api("/labels"))
                .json(&NewForgejoLabel {
                    name: label.name(),
                    color: &format!("#{}", label.color()),
                    description: label.description(),
                })
                .send()
                .await
                .map_err(ForgeError::Http)?;
            check_response(response).await?;
        }

        Ok(())
    }

    async fn pull_request_for_branch(
        &self,
        branch: &str,
    ) -> Result<Option<ReleasePullRequest>> {
        let pulls = self.list_pulls("open").await?;

        Ok(pulls
            .into_iter()
            .find(|pull| {
                pull.head.ref_name == branch && pull.base.ref_name == self.options.base_branch
            })
            .map(ForgejoPull::into_release_pull_request))
    }

    async fn create_pull_request(&self, pr: &mut ReleasePullRequest) -> Result<()> {
        let response = self
            .client
            .post(self.api("/pulls"))
            .json(&NewForgejoPull {
                title: &pr.pr.title,
                head: &pr.head,
                base: &self.options.base_branch,
                body: &pr.pr.description,
            })
            .send()
            .await
            .map_err(ForgeError::Http)?;
        let created: ForgejoPull = check_response(response)
            .await?
            .json()
            .await
            .map_err(ForgeError::Http)?;

        pr.pr.id = created.number;

        let labels = pr.labels.clone();
        self.set_pull_request_labels(pr, &[], &labels).await
    }

    async fn update_pull_request(&self, pr: &ReleasePullRequest) -> Result<()> {
        let response = self
            .client
            .patch(self.api(&format!("/pulls/{}", pr.pr.id)))
            .json(&UpdateForgejoPull {
                title: Some(&pr.pr.title),
                body: Some(&pr.pr.description),
                state: None,
            })
            .send()
            .await
            .map_err(ForgeError::Http)?;
        check_response(response).await?;
        Ok(())
    }

    async fn set_pull_request_labels(
        &self,
        pr: &ReleasePullRequest,
        remove: &[Label],
        add: &[Label],
    ) -> Result<()> {
        // The issue label endpoints work on label ids, not names.
        for id in self.label_ids(remove).await? {
            let response = self
                .client
                .delete(self.api(&format!("/issues/{}/labels/{id}", pr.pr.id)))
                .send()
                .await
                .map_err(ForgeError::Http)?;
            check_response(response).await?;
        }

        let add_ids = self.label_ids(add).await?;
        if add_ids.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.api(&format!("/issues/{}/labels", pr.pr.id)))
            .json(&AddForgejoLabels { labels: add_ids })
            .send()
            .await
            .map_err(ForgeError::Http)?;
        check_response(response).await?;
        Ok(())
    }

    async fn close_pull_request(&self, pr: &ReleasePullRequest) -> Result<()> {
        let response = self
            .client
            .patch(self.api(&format!("/pulls/{}", pr.pr.id)))
            .json(&UpdateForgejoPull {
                title: None,
                body: None,
                state: Some("closed"),
            })
            .send()
            .await
            .map_err(ForgeError::Http)?;
        check_response(response).await?;
        Ok(())
    }

    async fn pending_releases(&self, label: Label) -> Result<Vec<ReleasePullRequest>> {
        let pulls = self.list_pulls("closed").await?;

        Ok(pulls
            .into_iter()
            .filter(|pull| {
                pull.merged
                    && pull.base.ref_name == self.options.base_branch
                    && pull.labels.iter().any(|l| l.name == label.name())
            })
            .map(ForgejoPull::into_release_pull_request)
            .collect())
    }

    async fn create_release(
        &self,
        commit: &Commit,
        title: &str,
        changelog: &str,
        prerelease: bool,
        _latest: bool,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.api("/releases"))
            .json(&NewForgejoRelease {
                tag_name: title,
                target_commitish: &commit.hash,
                name: title,
                body: changelog,
                prerelease,
            })
            .send()
            .await
            .map_err(ForgeError::Http)?;
        check_response(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ForgejoTag {
    name: String,
    commit: ForgejoCommitRef,
}

#[derive(Debug, Deserialize)]
struct ForgejoCommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ForgejoCommit {
    sha: String,
    commit: ForgejoCommitDetails,
}

#[derive(Debug, Deserialize)]
struct ForgejoCommitDetails {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ForgejoComparison {
    commits: Vec<ForgejoCommit>,
}

#[derive(Debug, Deserialize)]
struct ForgejoLabel {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ForgejoRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct ForgejoUser {
    login: String,
    #[serde(default)]
    full_name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct ForgejoPull {
    number: u64,
    title: String,
    body: Option<String>,
    #[serde(default)]
    labels: Vec<ForgejoLabel>,
    head: ForgejoRef,
    base: ForgejoRef,
    #[serde(default)]
    merged: bool,
    merge_commit_sha: Option<String>,
}

impl ForgejoPull {
    fn into_pull_request(self) -> PullRequest {
        PullRequest {
            id: self.number,
            title: self.title,
            description: self.body.unwrap_or_default(),
        }
    }

    fn into_release_pull_request(self) -> ReleasePullRequest {
        let labels = self
            .labels
            .iter()
            .filter_map(|label| Label::from_name(&label.name))
            .collect();
        let release_commit = self.merge_commit_sha.clone().map(Commit::from_hash);
        let head = self.head.ref_name.clone();

        ReleasePullRequest {
            pr: self.into_pull_request(),
            labels,
            head,
            release_commit,
        }
    }
}

#[derive(Debug, Serialize)]
struct NewForgejoLabel<'a> {
    name: &'a str,
    color: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct AddForgejoLabels {
    labels: Vec<u64>,
}

#[derive(Debug, Serialize)]
struct NewForgejoPull<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateForgejoPull<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct NewForgejoRelease<'a> {
    tag_name: &'a str,
    target_commitish: &'a str,
    name: &'a str,
    body: &'a str,
    prerelease: bool,
}
