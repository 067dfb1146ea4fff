//! Changelog entry rendering.

use std::collections::HashMap;

use log::warn;
use minijinja::context;
use serde::Serialize;

use crate::commitparser::AnalyzedCommit;
use crate::error::Result;
use crate::markdown;
use crate::templates;

// Sections appear in this order; commits of any other type do not show up
// in the rendered changelog even when they caused the version bump.
const SECTIONS: &[(&str, &str)] = &[("feat", "Features"), ("fix", "Bug Fixes")];

/// Everything needed to render one changelog entry.
#[derive(Debug, Clone)]
pub struct Data {
    sections: Vec<Section>,
    version: String,
    version_url: String,
    prefix: String,
    suffix: String,
}

#[derive(Debug, Clone, Serialize)]
struct Section {
    title: String,
    commits: Vec<SectionCommit>,
}

#[derive(Debug, Clone, Serialize)]
struct SectionCommit {
    description: String,
    scope: Option<String>,
    breaking: bool,
}

impl Data {
    /// Prepare changelog data from commits grouped by type.
    pub fn new(
        commits: HashMap<String, Vec<AnalyzedCommit>>,
        version: impl Into<String>,
        version_url: impl Into<String>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        let sections = SECTIONS
            .iter()
            .filter_map(|(commit_type, title)| {
                let group = commits.get(*commit_type)?;
                Some(Section {
                    title: title.to_string(),
                    commits: group
                        .iter()
                        .map(|commit| SectionCommit {
                            description: commit.description.clone(),
                            scope: commit.scope.clone(),
                            breaking: commit.breaking,
                        })
                        .collect(),
                })
            })
            .collect();

        Self {
            sections,
            version: version.into(),
            version_url: version_url.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }
}

/// Output tweaks for a rendered entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct Formatting {
    /// Drop the `## [version](url)` heading. Used for the PR body where the
    /// version is already in the title.
    pub hide_version_title: bool,
}

/// Render one versioned changelog entry as normalised Markdown.
pub fn entry(data: &Data, formatting: Formatting) -> Result<String> {
    let template = templates::environment().get_template(templates::CHANGELOG)?;
    let rendered = template.render(context! {
        sections => &data.sections,
        version => &data.version,
        version_url => &data.version_url,
        prefix => &data.prefix,
        suffix => &data.suffix,
        hide_version_title => formatting.hide_version_title,
    })?;

    match markdown::format(&rendered) {
        Ok(formatted) => Ok(formatted),
        Err(err) => {
            warn!("failed to format changelog entry, using unformatted: {err}");
            Ok(rendered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::Commit;
    use crate::commitparser::by_type;

    fn analyzed(
        commit_type: &str,
        description: &str,
        scope: Option<&str>,
        breaking: bool,
    ) -> AnalyzedCommit {
        AnalyzedCommit {
            commit: Commit {
                hash: "abc".to_string(),
                message: String::new(),
                pull_request: None,
            },
            commit_type: commit_type.to_string(),
            description: description.to_string(),
            scope: scope.map(str::to_string),
            breaking,
        }
    }

    fn render(commits: &[AnalyzedCommit], prefix: &str, suffix: &str) -> String {
        let data = Data::new(
            by_type(commits),
            "1.0.0",
            "https://example.com/1.0.0",
            prefix,
            suffix,
        );
        entry(&data, Formatting::default()).unwrap()
    }

    #[test]
    fn empty_entry_is_only_the_heading() {
        assert_eq!(render(&[], "", ""), "## [1.0.0](https://example.com/1.0.0)\n");
    }

    #[test]
    fn single_feature() {
        assert_eq!(
            render(&[analyzed("feat", "Foobar!", None, false)], "", ""),
            "## [1.0.0](https://example.com/1.0.0)\n\n### Features\n\n- Foobar!\n"
        );
    }

    #[test]
    fn breaking_prefix() {
        assert_eq!(
            render(&[analyzed("feat", "Foobar!", None, true)], "", ""),
            "## [1.0.0](https://example.com/1.0.0)\n\n### Features\n\n- **BREAKING**: Foobar!\n"
        );
    }

    #[test]
    fn single_fix() {
        assert_eq!(
            render(&[analyzed("fix", "Foobar!", None, false)], "", ""),
            "## [1.0.0](https://example.com/1.0.0)\n\n### Bug Fixes\n\n- Foobar!\n"
        );
    }

    #[test]
    fn scopes_and_section_order() {
        let commits = vec![
            analyzed("feat", "Blabla!", None, false),
            analyzed("feat", "So awesome!", Some("awesome"), false),
            analyzed("fix", "Foobar!", None, false),
            analyzed("fix", "So sad!", Some("sad"), false),
        ];
        assert_eq!(
            render(&commits, "", ""),
            "## [1.0.0](https://example.com/1.0.0)\n\n### Features\n\n- Blabla!\n- **awesome**: So awesome!\n\n### Bug Fixes\n\n- Foobar!\n- **sad**: So sad!\n"
        );
    }

    #[test]
    fn prefix_and_suffix_are_included() {
        let commits = vec![analyzed("fix", "Foobar!", None, false)];
        let got = render(&commits, "An important announcement.", "See you next time.");
        assert_eq!(
            got,
            "## [1.0.0](https://example.com/1.0.0)\n\nAn important announcement.\n\n### Bug Fixes\n\n- Foobar!\n\nSee you next time.\n"
        );
    }

    #[test]
    fn hidden_version_title() {
        let data = Data::new(
            by_type(&[analyzed("feat", "Foobar!", None, false)]),
            "1.0.0",
            "https://example.com/1.0.0",
            "",
            "",
        );
        let got = entry(
            &data,
            Formatting {
                hide_version_title: true,
            },
        )
        .unwrap();
        assert_eq!(got, "### Features\n\n- Foobar!\n");
    }
}
