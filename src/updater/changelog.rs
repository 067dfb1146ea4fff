//! CHANGELOG.md updater.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, UpdaterError};
use crate::updater::{ReleaseInfo, Updater};

const CHANGELOG_FILE: &str = "CHANGELOG.md";
const CHANGELOG_HEADER: &str = "# Changelog";

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(r"^# Changelog\n").expect("changelog header regex is valid"))
}

/// Prepends the new entry directly below the `# Changelog` header,
/// creating the file when it does not exist yet.
#[derive(Debug, Clone, Copy)]
pub struct Changelog;

impl Updater for Changelog {
    fn files(&self) -> Vec<PathBuf> {
        vec![PathBuf::from(CHANGELOG_FILE)]
    }

    fn create_missing(&self) -> bool {
        true
    }

    fn apply(&self, content: &str, info: &ReleaseInfo) -> Result<String> {
        let rest = match header_regex().find(content) {
            Some(header) => &content[header.end()..],
            None if content.is_empty() => content,
            None => {
                return Err(UpdaterError::Format {
                    path: PathBuf::from(CHANGELOG_FILE),
                    reason: "header does not match".to_string(),
                }
                .into());
            }
        };

        Ok(format!(
            "{CHANGELOG_HEADER}\n\n{}{rest}",
            info.changelog_entry
        ))
    }
}
