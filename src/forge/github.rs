//! GitHub adapter.

use std::env;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header;
use serde::{Deserialize, Serialize};

use crate::commit::{Commit, PullRequest, Releases, Tag};
use crate::error::{ForgeError, Result};
use crate::forge::{CommitAuthor, Forge, GitAuth, PER_PAGE, check_response, observe_tag};
use crate::releasepr::{Label, ReleasePullRequest};

const DEFAULT_API_URL: &str = "https://api.github.com";
const ENV_API_TOKEN: &str = "GITHUB_TOKEN";
const ENV_USERNAME: &str = "GITHUB_USER";
const ENV_REPOSITORY: &str = "GITHUB_REPOSITORY";
const USER_AGENT: &str = "releaser-pleaser";

/// Connection settings for [`GitHub`].
#[derive(Debug, Clone, Default)]
pub struct GitHubOptions {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Branch releases are cut from
    pub base_branch: String,
    /// API endpoint, defaults to `https://api.github.com`
    pub api_url: Option<String>,
    /// API token, defaults to `$GITHUB_TOKEN`
    pub api_token: Option<String>,
    /// Username for git-over-HTTP, defaults to `$GITHUB_USER`
    pub username: Option<String>,
}

impl GitHubOptions {
    fn autodiscover(&mut self) -> Result<()> {
        if self.api_token.is_none() {
            self.api_token = env::var(ENV_API_TOKEN).ok().filter(|v| !v.is_empty());
        }
        if self.username.is_none() {
            self.username = env::var(ENV_USERNAME).ok().filter(|v| !v.is_empty());
        }

        if self.owner.is_empty() || self.repo.is_empty() {
            let repository = env::var(ENV_REPOSITORY).unwrap_or_default();
            let (owner, repo) =
                repository
                    .split_once('/')
                    .ok_or_else(|| ForgeError::InvalidRepository {
                        value: repository.clone(),
                    })?;
            self.owner = owner.to_string();
            self.repo = repo.to_string();
        }

        Ok(())
    }
}

/// Forge implementation for GitHub.
pub struct GitHub {
    options: GitHubOptions,
    client: reqwest::Client,
}

impl GitHub {
    /// Build a client, reading missing options from the environment.
    pub fn new(mut options: GitHubOptions) -> Result<Self> {
        options.autodiscover()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, "application/vnd.github+json".parse().expect("static header"));
        if let Some(token) = &options.api_token {
            let mut value: header::HeaderValue = format!("Bearer {token}")
                .parse()
                .map_err(|_| ForgeError::MissingCredentials {
                    reason: format!("{ENV_API_TOKEN} contains invalid characters"),
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
        let base = self
            .options
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/');
        format!(
            "{base}/repos/{}/{}{path}",
            self.options.owner, self.options.repo
        )
    }

    async fn pr_for_commit(&self, hash: &str) -> Result<Option<PullRequest>> {
        // One request per commit. The list-all-pulls endpoint would need
        // fewer requests on big batches but has no upper bound on how far
        // back it must scan.
        let mut page: usize = 1;
        loop {
            let response = self
                .client
                .get(self.api(&format!("/commits/{hash}/pulls")))
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await
                .map_err(ForgeError::Http)?;
            let prs: Vec<GitHubPull> = check_response(response)
                .await?
                .json()
                .await
                .map_err(ForgeError::Http)?;
            let page_len = prs.len();

            // Only the PR that was squashed/merged into this commit counts.
            if let Some(pr) = prs
                .into_iter()
                .find(|pr| pr.merge_commit_sha.as_deref() == Some(hash))
            {
                return Ok(Some(pr.into_pull_request()));
            }

            if page_len < PER_PAGE {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn commits_on_branch(&self, since: Option<&Tag>) -> Result<Vec<GitHubCommit>> {
        let head = &self.options.base_branch;
        let mut commits = Vec::new();
        let mut page: usize = 1;

        loop {
            debug!("fetching commits: head={head} page={page}");
            let page_commits: Vec<GitHubCommit> = match since {
                Some(tag) => {
                    let response = self
                        .client
                        .get(self.api(&format!("/compare/{}...{head}", tag.hash)))
                        .query(&[("per_page", PER_PAGE), ("page", page)])
                        .send()
                        .await
                        .map_err(ForgeError::Http)?;
                    let comparison: GitHubComparison = check_response(response)
                        .await?
                        .json()
                        .await
                        .map_err(ForgeError::Http)?;
                    comparison.commits
                }
                None => {
                    let per_page = PER_PAGE.to_string();
                    let page_str = page.to_string();
                    let response = self
                        .client
                        .get(self.api("/commits"))
                        .query(&[
                            ("sha", head.as_str()),
                            ("per_page", per_page.as_str()),
                            ("page", page_str.as_str()),
                        ])
                        .send()
                        .await
                        .map_err(ForgeError::Http)?;
                    check_response(response)
                        .await?
                        .json()
                        .await
                        .map_err(ForgeError::Http)?
                }
            };

            let page_len = page_commits.len();
            commits.extend(page_commits);
            if page_len < PER_PAGE {
                return Ok(commits);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl Forge for GitHub {
    fn repo_url(&self) -> String {
        format!(
            "https://github.com/{}/{}",
            self.options.owner, self.options.repo
        )
    }

    fn clone_url(&self) -> String {
        format!("{}.git", self.repo_url())
    }

    fn release_url(&self, version: &str) -> String {
        format!("{}/releases/tag/{version}", self.repo_url())
    }

    fn pull_request_url(&self, id: u64) -> String {
        format!("{}/pull/{id}", self.repo_url())
    }

    fn git_auth(&self) -> Option<GitAuth> {
        Some(GitAuth {
            username: self.options.username.clone()?,
            password: self.options.api_token.clone()?,
        })
    }

    async fn commit_author(&self) -> Result<CommitAuthor> {
        let base = self
            .options
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/');
        let response = self
            .client
            .get(format!("{base}/user"))
            .send()
            .await
            .map_err(ForgeError::Http)?;
        let user: GitHubUser = check_response(response)
            .await?
            .json()
            .await
            .map_err(ForgeError::Http)?;

        Ok(CommitAuthor {
            email: format!("{}+{}@users.noreply.github.com", user.id, user.login),
            name: user.login,
        })
    }

    async fn latest_tags(&self) -> Result<Releases> {
        debug!("listing all tags in github repository");

        let mut releases = Releases::default();
        let mut page = 1;

        'pages: loop {
            let response = self
                .client
                .get(self.api("/tags"))
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await
                .map_err(ForgeError::Http)?;
            let tags: Vec<GitHubTag> = check_response(response)
                .await?
                .json()
                .await
                .map_err(ForgeError::Http)?;
            let page_len = tags.len();

            for gh_tag in tags {
                let tag = Tag {
                    hash: gh_tag.commit.sha,
                    name: gh_tag.name,
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
        let gh_commits = self.commits_on_branch(since).await?;

        let mut commits = Vec::with_capacity(gh_commits.len());
        for gh_commit in gh_commits {
            let pull_request = self.pr_for_commit(&gh_commit.sha).await?;
            commits.push(Commit {
                hash: gh_commit.sha,
                message: gh_commit.commit.message,
                pull_request,
            });
        }

        Ok(commits)
    }

    async fn ensure_labels_exist(&self, labels: &[Label]) -> Result<()> {
        let mut existing = Vec::new();
        let mut page = 1;
        loop {
            debug!("fetching labels on repo: page={page}");
            let response = self
                .client
                .get(self.api("/labels"))
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await
                .map_err(ForgeError::Http)?;
            let page_labels: Vec<GitHubLabel> = check_response(response)
                .await?
                .json()
                .await
                .map_err(ForgeError::Http)?;
            let page_len = page_labels.len();
            existing.extend(page_labels.into_iter().map(|label| label.name));
            if page_len < PER_PAGE {
                break;
            }
            page += 1;
        }

        for label in labels {
            if existing.iter().any(|name| name == label.name()) {
                continue;
            }
            info!("creating label in repository: label.name={}", label.name());
            let response = self
                .client
                .post(self.api("/labels"))
                .json(&NewGitHubLabel {
                    name: label.name(),
                    color: label.color(),
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
        let head_filter = format!("{}:{branch}", self.options.owner);
        let per_page = PER_PAGE.to_string();
        let response = self
            .client
            .get(self.api("/pulls"))
            .query(&[
                ("state", "open"),
                ("base", self.options.base_branch.as_str()),
                ("head", head_filter.as_str()),
                ("per_page", per_page.as_str()),
            ])
            .send()
            .await
            .map_err(ForgeError::Http)?;
        let prs: Vec<GitHubPull> = check_response(response)
            .await?
            .json()
            .await
            .map_err(ForgeError::Http)?;

        Ok(prs
            .into_iter()
            .find(|pr| pr.head.ref_name == branch)
            .map(GitHubPull::into_release_pull_request))
    }

    async fn create_pull_request(&self, pr: &mut ReleasePullRequest) -> Result<()> {
        let response = self
            .client
            .post(self.api("/pulls"))
            .json(&NewGitHubPull {
                title: &pr.pr.title,
                head: &pr.head,
                base: &self.options.base_branch,
                body: &pr.pr.description,
            })
            .send()
            .await
            .map_err(ForgeError::Http)?;
        let created: GitHubPull = check_response(response)
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
            .json(&UpdateGitHubPull {
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
        for label in remove {
            let response = self
                .client
                .delete(self.api(&format!("/issues/{}/labels/{}", pr.pr.id, label.name())))
                .send()
                .await
                .map_err(ForgeError::Http)?;
            check_response(response).await?;
        }

        if add.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.api(&format!("/issues/{}/labels", pr.pr.id)))
            .json(&AddGitHubLabels {
                labels: add.iter().map(|label| label.name()).collect(),
            })
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
            .json(&UpdateGitHubPull {
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
        let mut pending = Vec::new();
        let mut page: usize = 1;

        loop {
            let per_page = PER_PAGE.to_string();
            let page_str = page.to_string();
            let response = self
                .client
                .get(self.api("/pulls"))
                .query(&[
                    ("state", "closed"),
                    ("base", self.options.base_branch.as_str()),
                    ("per_page", per_page.as_str()),
                    ("page", page_str.as_str()),
                ])
                .send()
                .await
                .map_err(ForgeError::Http)?;
            let prs: Vec<GitHubPull> = check_response(response)
                .await?
                .json()
                .await
                .map_err(ForgeError::Http)?;
            let page_len = prs.len();

            pending.extend(
                prs.into_iter()
                    .filter(|pr| {
                        pr.labels.iter().any(|l| l.name == label.name())
                            // Closed but never merged PRs are not releases.
                            && pr.merged_at.is_some()
                    })
                    .map(GitHubPull::into_release_pull_request),
            );

            if page_len < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(pending)
    }

    async fn create_release(
        &self,
        commit: &Commit,
        title: &str,
        changelog: &str,
        prerelease: bool,
        latest: bool,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.api("/releases"))
            .json(&NewGitHubRelease {
                tag_name: title,
                target_commitish: &commit.hash,
                name: title,
                body: changelog,
                prerelease,
                make_latest: if latest { "true" } else { "false" },
            })
            .send()
            .await
            .map_err(ForgeError::Http)?;
        check_response(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GitHubTag {
    name: String,
    commit: GitHubCommitRef,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitHubCommit {
    sha: String,
    commit: GitHubCommitDetails,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitDetails {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GitHubComparison {
    commits: Vec<GitHubCommit>,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubPull {
    number: u64,
    title: String,
    body: Option<String>,
    labels: Vec<GitHubLabel>,
    head: GitHubRef,
    merge_commit_sha: Option<String>,
    merged_at: Option<String>,
}

impl GitHubPull {
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
struct NewGitHubLabel<'a> {
    name: &'a str,
    color: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct AddGitHubLabels<'a> {
    labels: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct NewGitHubPull<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateGitHubPull<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct NewGitHubRelease<'a> {
    tag_name: &'a str,
    target_commitish: &'a str,
    name: &'a str,
    body: &'a str,
    prerelease: bool,
    make_latest: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_release_pull_request_keeps_known_labels() {
        let pull = GitHubPull {
            number: 4,
            title: "chore(main): release v1.0.0".to_string(),
            body: None,
            labels: vec![
                GitHubLabel {
                    name: "rp-release::pending".to_string(),
                },
                GitHubLabel {
                    name: "enhancement".to_string(),
                },
            ],
            head: GitHubRef {
                ref_name: "releaser-pleaser--branches--main".to_string(),
            },
            merge_commit_sha: Some("abc123".to_string()),
            merged_at: Some("2024-05-01T12:00:00Z".to_string()),
        };

        let pr = pull.into_release_pull_request();
        assert_eq!(pr.labels, vec![Label::ReleasePending]);
        assert_eq!(pr.release_commit.unwrap().hash, "abc123");
        assert_eq!(pr.head, "releaser-pleaser--branches--main");
    }
}
