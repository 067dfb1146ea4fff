//! package.json version field updater.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::updater::{ReleaseInfo, Updater};

fn version_field_regex() -> &'static Regex {
    static FIELD: OnceLock<Regex> = OnceLock::new();
    FIELD.get_or_init(|| {
        Regex::new(r#"("version"\s*:\s*)"[^"]*""#).expect("package.json version regex is valid")
    })
}

/// Rewrites the `"version"` field of package.json, preserving the
/// surrounding formatting. No-op when the field is absent.
#[derive(Debug, Clone, Copy)]
pub struct PackageJson;

impl Updater for PackageJson {
    fn files(&self) -> Vec<PathBuf> {
        vec![PathBuf::from("package.json")]
    }

    fn apply(&self, content: &str, info: &ReleaseInfo) -> Result<String> {
        // npm versions carry no `v` prefix
        let version = info.version.strip_prefix('v').unwrap_or(&info.version);

        Ok(version_field_regex()
            .replace_all(content, format!("${{1}}\"{version}\""))
            .into_owned())
    }
}
