//! File-content transformers applied to the release branch.

use std::path::PathBuf;

use crate::error::Result;

mod changelog;
mod generic;
mod helmchart;
mod packagejson;

pub use changelog::Changelog;
pub use generic::Generic;
pub use helmchart::HelmChart;
pub use packagejson::PackageJson;

/// Data available to updaters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Next version, with `v` prefix
    pub version: String,
    /// Rendered changelog entry including the version heading
    pub changelog_entry: String,
}

/// A pure transformation of file content for a release.
pub trait Updater: Send + Sync {
    /// Repository-relative paths this updater applies to.
    fn files(&self) -> Vec<PathBuf>;

    /// Whether missing files should be created instead of failing.
    fn create_missing(&self) -> bool {
        false
    }

    /// Transform the file content. Must be deterministic in
    /// `(content, info)` and must not touch anything but the returned text.
    fn apply(&self, content: &str, info: &ReleaseInfo) -> Result<String>;
}

/// Updater names accepted on the command line.
pub const KNOWN_UPDATERS: &[&str] = &["changelog", "generic", "packagejson", "helmchart"];

/// Updaters enabled when the user does not configure any.
pub const DEFAULT_UPDATERS: &[&str] = &["changelog", "generic"];

/// Construct an updater by its command-line name.
pub fn by_name(name: &str, extra_files: &[String]) -> Option<Box<dyn Updater>> {
    match name {
        "changelog" => Some(Box::new(Changelog)),
        "generic" => Some(Box::new(Generic::new(extra_files.to_vec()))),
        "packagejson" => Some(Box::new(PackageJson)),
        "helmchart" => Some(Box::new(HelmChart)),
        _ => None,
    }
}
