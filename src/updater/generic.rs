//! Marker-based version rewriting in arbitrary files.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::updater::{ReleaseInfo, Updater};

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"\d+\.\d+\.\d+(-[\w.]+)?(.*x-releaser-pleaser-version)")
            .expect("version marker regex is valid")
    })
}

/// Replaces any SemVer token on a line carrying the
/// `x-releaser-pleaser-version` marker with the new version.
#[derive(Debug, Clone)]
pub struct Generic {
    files: Vec<String>,
}

impl Generic {
    /// Updater over the user-supplied list of extra files.
    pub fn new(files: Vec<String>) -> Self {
        Self { files }
    }
}

impl Updater for Generic {
    fn files(&self) -> Vec<PathBuf> {
        self.files.iter().map(PathBuf::from).collect()
    }

    fn apply(&self, content: &str, info: &ReleaseInfo) -> Result<String> {
        // The `v` prefix is kept out of the replacement so the users'
        // formatting decides whether it appears.
        let version = info.version.strip_prefix('v').unwrap_or(&info.version);

        Ok(marker_regex()
            .replace_all(content, format!("{version}${{2}}"))
            .into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(content: &str, version: &str) -> String {
        Generic::new(vec!["version.txt".to_string()])
            .apply(
                content,
                &ReleaseInfo {
                    version: version.to_string(),
                    changelog_entry: String::new(),
                },
            )
            .unwrap()
    }

    #[test]
    fn single_line() {
        assert_eq!(
            apply("v1.0.0 // x-releaser-pleaser-version", "v1.2.0"),
            "v1.2.0 // x-releaser-pleaser-version"
        );
    }

    #[test]
    fn only_marked_lines_change() {
        assert_eq!(
            apply("Foooo\nv1.0.0\nv1.0.0 // x-releaser-pleaser-version\n", "v1.2.0"),
            "Foooo\nv1.0.0\nv1.2.0 // x-releaser-pleaser-version\n"
        );
    }

    #[test]
    fn partial_versions_are_ignored() {
        assert_eq!(
            apply("1.0 // x-releaser-pleaser-version", "v1.2.0"),
            "1.0 // x-releaser-pleaser-version"
        );
    }

    #[test]
    fn prerelease_versions_are_replaced_whole() {
        assert_eq!(
            apply(
                "version: v1.2.0-alpha.1 => Awesome, isnt it? x-releaser-pleaser-version foobar",
                "v1.2.0"
            ),
            "version: v1.2.0 => Awesome, isnt it? x-releaser-pleaser-version foobar"
        );
    }
}
