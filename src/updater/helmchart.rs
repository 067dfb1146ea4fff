//! Chart.yaml version field updater.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::updater::{ReleaseInfo, Updater};

fn version_line_regex() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        // Anchored at the line start so nested version fields
        // (e.g. in dependencies) stay untouched.
        Regex::new(r"(?m)^(version:[ \t]*)\S*$").expect("Chart.yaml version regex is valid")
    })
}

/// Rewrites the top-level `version:` line of Chart.yaml. No-op when the
/// line is absent.
#[derive(Debug, Clone, Copy)]
pub struct HelmChart;

impl Updater for HelmChart {
    fn files(&self) -> Vec<PathBuf> {
        vec![PathBuf::from("Chart.yaml")]
    }

    fn apply(&self, content: &str, info: &ReleaseInfo) -> Result<String> {
        Ok(version_line_regex()
            .replace_all(content, format!("${{1}}{}", info.version))
            .into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(content: &str) -> String {
        HelmChart
            .apply(
                content,
                &ReleaseInfo {
                    version: "v2.0.5".to_string(),
                    changelog_entry: String::new(),
                },
            )
            .unwrap()
    }

    #[test]
    fn rewrites_version_line() {
        assert_eq!(
            apply("apiVersion: v2\nname: test\nversion: v1.0.0"),
            "apiVersion: v2\nname: test\nversion: v2.0.5"
        );
    }

    #[test]
    fn nested_versions_stay_untouched() {
        let content = "apiVersion: v2\nname: test\nversion: 1.0.0\ndependencies:\n  - name: somechart\n    version: 1.2.3\n";
        assert_eq!(
            apply(content),
            "apiVersion: v2\nname: test\nversion: v2.0.5\ndependencies:\n  - name: somechart\n    version: 1.2.3\n"
        );
    }

    #[test]
    fn no_op_without_version_line() {
        assert_eq!(apply("not yaml"), "not yaml");
        assert_eq!(apply("apiVersion: v2\nname: test"), "apiVersion: v2\nname: test");
    }
}
