//! Error types for all releaser-pleaser operations.
//!
//! The top-level [`Error`] delegates to one sub-enum per domain so callers
//! can match on the failure kind without inspecting message strings.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for releaser-pleaser operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for all releaser-pleaser operations
#[derive(Error, Debug)]
pub enum Error {
    /// Forge API errors
    #[error("forge error: {0}")]
    Forge(#[from] ForgeError),

    /// Git working copy errors
    #[error("git error: {0}")]
    Git(#[from] GitError),

    /// Malformed input (tags, versions, titles, Markdown)
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A precondition on forge state was violated
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// File updater errors
    #[error("updater error: {0}")]
    Updater(#[from] UpdaterError),

    /// Command line usage errors
    #[error("cli error: {0}")]
    Cli(#[from] CliError),

    /// The release PR description changed between read and write
    #[error("conflict: pull request description was changed while releaser-pleaser was running")]
    PullRequestConflict,

    /// The run was canceled by a shutdown signal
    #[error("operation canceled")]
    Canceled,

    /// Template rendering errors
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors talking to the forge API
#[derive(Error, Debug)]
pub enum ForgeError {
    /// Transport-level HTTP failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The forge answered with a non-success status
    #[error("api error: {status} {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or status text
        message: String,
    },

    /// Required credentials are not configured
    #[error("missing credentials: {reason}")]
    MissingCredentials {
        /// What is missing and where to set it
        reason: String,
    },

    /// The repository selector could not be resolved
    #[error("invalid repository {value:?}: expected owner/repo")]
    InvalidRepository {
        /// The offending selector
        value: String,
    },
}

/// Errors from the local git working copy
#[derive(Error, Debug)]
pub enum GitError {
    /// Errors bubbled up from libgit2
    #[error(transparent)]
    Internal(#[from] git2::Error),

    /// A referenced branch does not exist
    #[error("branch {name:?} not found")]
    BranchNotFound {
        /// Branch name
        name: String,
    },

    /// The repository has no working directory
    #[error("repository has no working directory")]
    MissingWorkdir,
}

/// Errors from parsing versions, titles and tags
#[derive(Error, Debug)]
pub enum ParseError {
    /// A version string is not valid SemVer
    #[error("invalid version {version:?}: {source}")]
    Version {
        /// The version string
        version: String,
        /// Underlying semver error
        source: semver::Error,
    },

    /// The previous tag carries a pre-release segment we cannot continue
    #[error("invalid format of previous tag {version:?}")]
    PrereleaseFormat {
        /// The tag version
        version: String,
    },

    /// A pull request title does not match the release title format
    #[error("pull request title has unexpected format: {title:?}")]
    Title {
        /// The offending title
        title: String,
    },

    /// A Markdown document could not be normalised
    #[error("markdown normalisation failed: {reason}")]
    Markdown {
        /// What the normaliser choked on
        reason: String,
    },
}

/// Violated preconditions on forge state
#[derive(Error, Debug)]
pub enum StateError {
    /// A pending release PR has no merge commit
    #[error("pull request !{id} is missing the merge commit")]
    MissingReleaseCommit {
        /// Pull request id
        id: u64,
    },

    /// The release PR disappeared mid-run
    #[error("pull request was deleted while releaser-pleaser was running")]
    PullRequestDeleted,

    /// Versioning was attempted without any releasable commits
    #[error("cannot compute a next version without releasable changes")]
    UnknownBump,
}

/// Command line usage errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Arguments do not form a runnable configuration
    #[error("invalid arguments: {reason}")]
    InvalidArguments {
        /// What is wrong
        reason: String,
    },
}

/// Errors from file updaters
#[derive(Error, Debug)]
pub enum UpdaterError {
    /// A file the updater requires does not exist
    #[error("file {path:?} does not exist")]
    MissingFile {
        /// Path relative to the repository root
        path: PathBuf,
    },

    /// A file exists but does not match the format the updater requires
    #[error("unexpected format of {path:?}: {reason}")]
    Format {
        /// Path relative to the repository root
        path: PathBuf,
        /// What was expected
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_kind_prefix() {
        let err: Error = ForgeError::MissingCredentials {
            reason: "set GITHUB_TOKEN".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("forge error:"));
    }

    #[test]
    fn conflict_is_matchable() {
        let err = Error::PullRequestConflict;
        assert!(matches!(err, Error::PullRequestConflict));
    }
}
