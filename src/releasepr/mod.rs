//! The release pull request: title and body codec, labels, overrides.

use std::sync::OnceLock;

use minijinja::context;
use regex::Regex;

use crate::commit::{Commit, PullRequest};
use crate::error::{ParseError, Result};
use crate::markdown;
use crate::templates;
use crate::versioning::NextVersionType;

mod label;

pub use label::{KNOWN_LABELS, Label};

const PREFIX_BLOCK_LANGUAGE: &str = "rp-prefix";
const SUFFIX_BLOCK_LANGUAGE: &str = "rp-suffix";
const CHANGELOG_SECTION: &str = "changelog";

fn title_regex() -> &'static Regex {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    TITLE.get_or_init(|| {
        Regex::new(r"chore\((?P<branch>.*)\): release (?P<version>.*)")
            .expect("release title regex is valid")
    })
}

/// User-editable fields of the release PR that modulate the next release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseOverrides {
    /// Text prepended to the release notes
    pub prefix: String,
    /// Text appended to the release notes
    pub suffix: String,
    /// Requested kind of the next version
    pub next_version_type: NextVersionType,
}

/// The single pull request this tool maintains per target branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePullRequest {
    /// The underlying pull request
    pub pr: PullRequest,
    /// Well-known labels present on the PR; unknown labels are dropped
    pub labels: Vec<Label>,
    /// Head branch name
    pub head: String,
    /// Merge/squash commit, populated for merged PRs only
    pub release_commit: Option<Commit>,
}

impl ReleasePullRequest {
    /// Build a fresh release PR proposing `version` for `branch`.
    pub fn new(
        head: impl Into<String>,
        branch: &str,
        version: &str,
        changelog_entry: &str,
    ) -> Result<Self> {
        let mut pr = Self {
            pr: PullRequest {
                id: 0,
                title: String::new(),
                description: String::new(),
            },
            labels: vec![Label::ReleasePending],
            head: head.into(),
            release_commit: None,
        };

        pr.set_title(branch, version);
        pr.set_description(changelog_entry, &ReleaseOverrides::default())?;

        Ok(pr)
    }

    /// Set the title to `chore(<branch>): release <version>`.
    pub fn set_title(&mut self, branch: &str, version: &str) {
        self.pr.title = format!("chore({branch}): release {version}");
    }

    /// Extract the proposed version from the title.
    pub fn version(&self) -> Result<String> {
        let captures = title_regex()
            .captures(&self.pr.title)
            .ok_or_else(|| ParseError::Title {
                title: self.pr.title.clone(),
            })?;

        Ok(captures["version"].to_string())
    }

    /// Render the description from the changelog entry and overrides.
    pub fn set_description(
        &mut self,
        changelog_entry: &str,
        overrides: &ReleaseOverrides,
    ) -> Result<()> {
        let template = templates::environment().get_template(templates::RELEASE_PR)?;
        self.pr.description = template.render(context! {
            changelog => changelog_entry.trim_end(),
            prefix => &overrides.prefix,
            suffix => &overrides.suffix,
        })?;

        Ok(())
    }

    /// Parse overrides from labels and the description.
    ///
    /// When conflicting next-version labels are present the last one in the
    /// forge's label order wins.
    pub fn get_overrides(&self) -> ReleaseOverrides {
        let mut overrides = ReleaseOverrides::default();

        for label in &self.labels {
            match label {
                Label::NextVersionNormal => {
                    overrides.next_version_type = NextVersionType::Normal;
                }
                Label::NextVersionRc => overrides.next_version_type = NextVersionType::Rc,
                Label::NextVersionBeta => overrides.next_version_type = NextVersionType::Beta,
                Label::NextVersionAlpha => overrides.next_version_type = NextVersionType::Alpha,
                // Release state labels have no effect on versioning.
                Label::ReleasePending | Label::ReleaseTagged => {}
            }
        }

        if let Some(prefix) = markdown::fenced_code_block(&self.pr.description, PREFIX_BLOCK_LANGUAGE)
        {
            overrides.prefix = prefix;
        }
        if let Some(suffix) = markdown::fenced_code_block(&self.pr.description, SUFFIX_BLOCK_LANGUAGE)
        {
            overrides.suffix = suffix;
        }

        overrides
    }

    /// The changelog section of the description, without the markers.
    /// Empty when the description carries no such section.
    pub fn changelog_text(&self) -> String {
        markdown::section_text(&self.pr.description, CHANGELOG_SECTION).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_pr() -> ReleasePullRequest {
        ReleasePullRequest {
            pr: PullRequest {
                id: 0,
                title: String::new(),
                description: String::new(),
            },
            labels: Vec::new(),
            head: String::new(),
            release_commit: None,
        }
    }

    #[test]
    fn title_round_trip() {
        let mut pr = empty_pr();
        pr.set_title("main", "v1.0.0");
        assert_eq!(pr.pr.title, "chore(main): release v1.0.0");
        assert_eq!(pr.version().unwrap(), "v1.0.0");

        pr.set_title("release-1.x", "v1.1.1-rc.0");
        assert_eq!(pr.pr.title, "chore(release-1.x): release v1.1.1-rc.0");
        assert_eq!(pr.version().unwrap(), "v1.1.1-rc.0");
    }

    #[test]
    fn version_rejects_foreign_titles() {
        let mut pr = empty_pr();
        pr.pr.title = "feat: something else".to_string();
        assert!(pr.version().is_err());
    }

    #[test]
    fn description_contains_changelog_section_and_override_blocks() {
        let mut pr = empty_pr();
        pr.set_description("## v1.0.0", &ReleaseOverrides::default())
            .unwrap();

        assert!(pr.pr.description.contains("<!-- section-start changelog -->"));
        assert!(pr.pr.description.contains("## v1.0.0"));
        assert!(pr.pr.description.contains("<!-- section-end changelog -->"));
        assert!(pr.pr.description.contains("```rp-prefix\n```"));
        assert!(pr.pr.description.contains("```rp-suffix\n```"));
    }

    #[test]
    fn changelog_round_trip() {
        let entry = "### Features\n\n- Foobar!\n\n### Bug Fixes\n\n- Baz";
        let mut pr = empty_pr();
        pr.set_description(entry, &ReleaseOverrides::default()).unwrap();
        assert_eq!(pr.changelog_text(), entry);
    }

    #[test]
    fn changelog_text_without_section_is_empty() {
        let mut pr = empty_pr();
        pr.pr.description = "# Foo\n".to_string();
        assert_eq!(pr.changelog_text(), "");
    }

    #[test]
    fn overrides_round_trip() {
        let overrides = ReleaseOverrides {
            prefix: "This release is awesome!".to_string(),
            suffix: "## Compatibility\n\nNo compatibility guarantees.".to_string(),
            next_version_type: NextVersionType::Rc,
        };

        let mut pr = empty_pr();
        pr.labels = vec![Label::NextVersionRc];
        pr.set_description("## v1.0.0", &overrides).unwrap();

        assert_eq!(pr.get_overrides(), overrides);
    }

    #[test]
    fn overrides_from_empty_pr_are_default() {
        assert_eq!(empty_pr().get_overrides(), ReleaseOverrides::default());
    }

    #[test]
    fn prefix_parsed_from_description() {
        let mut pr = empty_pr();
        pr.pr.description = "```rp-prefix\n## Foo\n\n- Cool thing\n```".to_string();
        assert_eq!(pr.get_overrides().prefix, "## Foo\n\n- Cool thing");
    }

    #[test]
    fn conflicting_version_labels_last_wins() {
        let mut pr = empty_pr();
        pr.labels = vec![Label::NextVersionAlpha, Label::NextVersionBeta];
        assert_eq!(pr.get_overrides().next_version_type, NextVersionType::Beta);
    }

    #[test]
    fn new_pr_is_labeled_pending() {
        let pr = ReleasePullRequest::new(
            "releaser-pleaser--branches--main",
            "main",
            "v0.1.0",
            "### Features\n\n- foo\n",
        )
        .unwrap();

        assert_eq!(pr.labels, vec![Label::ReleasePending]);
        assert_eq!(pr.pr.title, "chore(main): release v0.1.0");
        assert_eq!(pr.head, "releaser-pleaser--branches--main");
    }
}
