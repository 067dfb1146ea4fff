//! GitLab adapter.

use std::env;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header;
use serde::{Deserialize, Serialize};

use crate::commit::{Commit, PullRequest, Releases, Tag};
use crate::error::{ForgeError, Result};
use crate::forge::{CommitAuthor, Forge, GitAuth, PER_PAGE, check_response, observe_tag};
use crate::releasepr::{Label, ReleasePullRequest};

const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4";
const ENV_API_TOKEN: &str = "GITLAB_TOKEN";
const ENV_API_URL: &str = "CI_API_V4_URL";
const ENV_PROJECT_URL: &str = "CI_PROJECT_URL";
const ENV_PROJECT_PATH: &str = "CI_PROJECT_PATH";
const USER_AGENT: &str = "releaser-pleaser";

/// Connection settings for [`GitLab`].
#[derive(Debug, Clone, Default)]
pub struct GitLabOptions {
    /// Full project path, e.g. `group/project`
    pub project_path: String,
    /// Branch releases are cut from
    pub base_branch: String,
    /// API endpoint, defaults to `$CI_API_V4_URL` or `https://gitlab.com/api/v4`
    pub api_url: Option<String>,
    /// API token, defaults to `$GITLAB_TOKEN`
    pub api_token: Option<String>,
    /// Web URL of the project, defaults to `$CI_PROJECT_URL`
    pub project_url: Option<String>,
}

impl GitLabOptions {
    fn autodiscover(&mut self) -> Result<()> {
        if self.api_token.is_none() {
            self.api_token = env::var(ENV_API_TOKEN).ok().filter(|v| !v.is_empty());
        }
        if self.api_url.is_none() {
            self.api_url = env::var(ENV_API_URL).ok().filter(|v| !v.is_empty());
        }
        if self.project_url.is_none() {
            self.project_url = env::var(ENV_PROJECT_URL).ok().filter(|v| !v.is_empty());
        }
        if self.project_path.is_empty() {
            self.project_path = env::var(ENV_PROJECT_PATH).unwrap_or_default();
        }

        if self.project_path.is_empty() || !self.project_path.contains('/') {
            return Err(ForgeError::InvalidRepository {
                value: self.project_path.clone(),
            }
            .into());
        }

        Ok(())
    }
}

/// Forge implementation for GitLab.
pub struct GitLab {
    options: GitLabOptions,
    client: reqwest::Client,
}

impl GitLab {
    /// Build a client, reading missing options from the GitLab CI environment.
    pub fn new(mut options: GitLabOptions) -> Result<Self> {
        options.autodiscover()?;

        let mut headers = header::HeaderMap::new();
        if let Some(token) = &options.api_token {
            let mut value: header::HeaderValue =
                token.parse().map_err(|_| ForgeError::MissingCredentials {
                    reason: format!("{ENV_API_TOKEN} contains invalid characters"),
                })?;
            value.set_sensitive(true);
            headers.insert("PRIVATE-TOKEN", value);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(ForgeError::Http)?;

        Ok(Self { options, client })
    }

    fn project_url(&self) -> String {
        match &self.options.project_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://gitlab.com/{}", self.options.project_path),
        }
    }

    fn api(&self, path: &str) -> String {
        let base = self
            .options
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/');
        // Project paths are used as a single URL segment.
        let project = self.options.project_path.replace('/', "%2F");
        format!("{base}/projects/{project}{path}")
    }

    async fn mr_for_commit(&self, hash: &str) -> Result<Option<PullRequest>> {
        debug!("fetching merge requests associated with commit: commit.hash={hash}");
        let response = self
            .client
            .get(self.api(&format!("/repository/commits/{hash}/merge_requests")))
            .send()
            .await
            .map_err(ForgeError::Http)?;
        let mrs: Vec<GitLabMergeRequest> = check_response(response)
            .await?
            .json()
            .await
            .map_err(ForgeError::Http)?;

        // Depending on the merge method the resulting commit on the target
        // branch is the merge commit, the squash commit or the head itself.
        Ok(mrs
            .into_iter()
            .find(|mr| {
                mr.merge_commit_sha.as_deref() == Some(hash)
                    || mr.squash_commit_sha.as_deref() == Some(hash)
                    || mr.sha.as_deref() == Some(hash)
            })
            .map(GitLabMergeRequest::into_pull_request))
    }
}

#[async_trait]
impl Forge for GitLab {
    fn repo_url(&self) -> String {
        self.project_url()
    }

    fn clone_url(&self) -> String {
        format!("{}.git", self.project_url())
    }

    fn release_url(&self, version: &str) -> String {
        format!("{}/-/releases/{version}", self.project_url())
    }

    fn pull_request_url(&self, id: u64) -> String {
        format!("{}/-/merge_requests/{id}", self.project_url())
    }

    fn git_auth(&self) -> Option<GitAuth> {
        Some(GitAuth {
            // Username just needs to be any non-blank value
            username: "api-token".to_string(),
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
        let user: GitLabUser = check_response(response)
            .await?
            .json()
            .await
            .map_err(ForgeError::Http)?;

        let email = user
            .commit_email
            .or(user.email)
            .unwrap_or_else(|| format!("{}@users.noreply.gitlab.com", user.username));
        let name = if user.name.is_empty() {
            user.username
        } else {
            user.name
        };

        Ok(CommitAuthor { name, email })
    }

    async fn latest_tags(&self) -> Result<Releases> {
        debug!("listing all tags in gitlab repository");

        let mut releases = Releases::default();
        let mut page: usize = 1;

        'pages: loop {
            let per_page = PER_PAGE.to_string();
            let page_str = page.to_string();
            let response = self
                .client
                .get(self.api("/repository/tags"))
                .query(&[
                    ("order_by", "updated"),
                    ("per_page", per_page.as_str()),
                    ("page", page_str.as_str()),
                ])
                .send()
                .await
                .map_err(ForgeError::Http)?;
            let tags: Vec<GitLabTag> = check_response(response)
                .await?
                .json()
                .await
                .map_err(ForgeError::Http)?;
            let page_len = tags.len();

            for gl_tag in tags {
                let tag = Tag {
                    hash: gl_tag.commit.id,
                    name: gl_tag.name,
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
        let ref_name = match since {
            Some(tag) => format!("{}..{head}", tag.hash),
            None => head.clone(),
        };
        debug!("listing commits: ref.name={ref_name}");

        let mut gl_commits: Vec<GitLabCommit> = Vec::new();
        let mut page: usize = 1;
        loop {
            let per_page = PER_PAGE.to_string();
            let page_str = page.to_string();
            let response = self
                .client
                .get(self.api("/repository/commits"))
                .query(&[
                    ("ref_name", ref_name.as_str()),
                    ("per_page", per_page.as_str()),
                    ("page", page_str.as_str()),
                ])
                .send()
                .await
                .map_err(ForgeError::Http)?;
            let page_commits: Vec<GitLabCommit> = check_response(response)
                .await?
                .json()
                .await
                .map_err(ForgeError::Http)?;
            let page_len = page_commits.len();
            gl_commits.extend(page_commits);
            if page_len < PER_PAGE {
                break;
            }
            page += 1;
        }

        let mut commits = Vec::with_capacity(gl_commits.len());
        for gl_commit in gl_commits {
            let pull_request = self.mr_for_commit(&gl_commit.id).await?;
            commits.push(Commit {
                hash: gl_commit.id,
                message: gl_commit.message,
                pull_request,
            });
        }

        Ok(commits)
    }

    async fn ensure_labels_exist(&self, labels: &[Label]) -> Result<()> {
        debug!("fetching labels on repo");
        let mut existing = Vec::new();
        let mut page: usize = 1;
        loop {
            let per_page = PER_PAGE.to_string();
            let page_str = page.to_string();
            let response = self
                .client
                .get(self.api("/labels"))
                .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())])
                .send()
                .await
                .map_err(ForgeError::Http)?;
            let page_labels: Vec<GitLabLabel> = check_response(response)
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
                .json(&NewGitLabLabel {
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
        // There is only ever a single open MR from the release branch onto
        // the target branch, no pagination needed.
        let per_page = PER_PAGE.to_string();
        let response = self
            .client
            .get(self.api("/merge_requests"))
            .query(&[
                ("state", "opened"),
                ("source_branch", branch),
                ("target_branch", self.options.base_branch.as_str()),
                ("per_page", per_page.as_str()),
            ])
            .send()
            .await
            .map_err(ForgeError::Http)?;
        let mrs: Vec<GitLabMergeRequest> = check_response(response)
            .await?
            .json()
            .await
            .map_err(ForgeError::Http)?;

        Ok(mrs
            .into_iter()
            .next()
            .map(GitLabMergeRequest::into_release_pull_request))
    }

    async fn create_pull_request(&self, pr: &mut ReleasePullRequest) -> Result<()> {
        let labels = pr
            .labels
            .iter()
            .map(|label| label.name())
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client
            .post(self.api("/merge_requests"))
            .json(&NewGitLabMergeRequest {
                title: &pr.pr.title,
                description: &pr.pr.description,
                source_branch: &pr.head,
                target_branch: &self.options.base_branch,
                labels: &labels,
            })
            .send()
            .await
            .map_err(ForgeError::Http)?;
        let created: GitLabMergeRequest = check_response(response)
            .await?
            .json()
            .await
            .map_err(ForgeError::Http)?;

        pr.pr.id = created.iid;
        Ok(())
    }

    async fn update_pull_request(&self, pr: &ReleasePullRequest) -> Result<()> {
        let response = self
            .client
            .put(self.api(&format!("/merge_requests/{}", pr.pr.id)))
            .json(&UpdateGitLabMergeRequest {
                title: Some(&pr.pr.title),
                description: Some(&pr.pr.description),
                ..Default::default()
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
        let remove_labels = remove
            .iter()
            .map(|label| label.name())
            .collect::<Vec<_>>()
            .join(",");
        let add_labels = add
            .iter()
            .map(|label| label.name())
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client
            .put(self.api(&format!("/merge_requests/{}", pr.pr.id)))
            .json(&UpdateGitLabMergeRequest {
                remove_labels: Some(&remove_labels),
                add_labels: Some(&add_labels),
                ..Default::default()
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
            .put(self.api(&format!("/merge_requests/{}", pr.pr.id)))
            .json(&UpdateGitLabMergeRequest {
                state_event: Some("close"),
                ..Default::default()
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
                .get(self.api("/merge_requests"))
                .query(&[
                    ("state", "merged"),
                    ("labels", label.name()),
                    ("target_branch", self.options.base_branch.as_str()),
                    ("per_page", per_page.as_str()),
                    ("page", page_str.as_str()),
                ])
                .send()
                .await
                .map_err(ForgeError::Http)?;
            let mrs: Vec<GitLabMergeRequest> = check_response(response)
                .await?
                .json()
                .await
                .map_err(ForgeError::Http)?;
            let page_len = mrs.len();

            pending.extend(
                mrs.into_iter()
                    .map(GitLabMergeRequest::into_release_pull_request),
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
        _prerelease: bool,
        _latest: bool,
    ) -> Result<()> {
        // GitLab derives both flags from the tag itself.
        let response = self
            .client
            .post(self.api("/releases"))
            .json(&NewGitLabRelease {
                name: title,
                tag_name: title,
                description: changelog,
                r#ref: &commit.hash,
            })
            .send()
            .await
            .map_err(ForgeError::Http)?;
        check_response(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GitLabTag {
    name: String,
    commit: GitLabCommitRef,
}

#[derive(Debug, Deserialize)]
struct GitLabCommitRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GitLabCommit {
    id: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct GitLabLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitLabUser {
    username: String,
    #[serde(default)]
    name: String,
    email: Option<String>,
    commit_email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitLabMergeRequest {
    iid: u64,
    title: String,
    description: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    source_branch: String,
    sha: Option<String>,
    merge_commit_sha: Option<String>,
    squash_commit_sha: Option<String>,
}

impl GitLabMergeRequest {
    fn into_pull_request(self) -> PullRequest {
        PullRequest {
            id: self.iid,
            title: self.title,
            description: self.description.unwrap_or_default(),
        }
    }

    fn into_release_pull_request(self) -> ReleasePullRequest {
        let labels = self
            .labels
            .iter()
            .filter_map(|name| Label::from_name(name))
            .collect();
        // Which commit landed on the target branch depends on the merge
        // method configured for the project.
        let release_commit = self
            .merge_commit_sha
            .clone()
            .or_else(|| self.squash_commit_sha.clone())
            .or_else(|| self.sha.clone())
            .map(Commit::from_hash);
        let head = self.source_branch.clone();

        ReleasePullRequest {
            pr: self.into_pull_request(),
            labels,
            head,
            release_commit,
        }
    }
}

#[derive(Debug, Serialize)]
struct NewGitLabLabel<'a> {
    name: &'a str,
    color: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct NewGitLabMergeRequest<'a> {
    title: &'a str,
    description: &'a str,
    source_branch: &'a str,
    target_branch: &'a str,
    labels: &'a str,
}

#[derive(Debug, Default, Serialize)]
struct UpdateGitLabMergeRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    add_labels: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remove_labels: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_event: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct NewGitLabRelease<'a> {
    name: &'a str,
    tag_name: &'a str,
    description: &'a str,
    r#ref: &'a str,
}
