//! Next-version derivation from prior releases and conventional commits.

use semver::{Prerelease, Version};

use crate::commit::{Releases, Tag};
use crate::commitparser::AnalyzedCommit;
use crate::error::{ParseError, Result, StateError};

/// The SemVer increment category implied by a set of commits.
///
/// Ordered so that the strongest bump wins when aggregating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionBump {
    /// No releasable change
    Unknown,
    /// Bug fixes only
    Patch,
    /// New features
    Minor,
    /// Breaking changes
    Major,
}

/// The kind of version requested through release PR labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NextVersionType {
    /// No override requested
    #[default]
    Undefined,
    /// Force a stable version
    Normal,
    /// Release candidate pre-release
    Rc,
    /// Beta pre-release
    Beta,
    /// Alpha pre-release
    Alpha,
}

impl NextVersionType {
    /// The pre-release identifier for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NextVersionType::Undefined => "undefined",
            NextVersionType::Normal => "normal",
            NextVersionType::Rc => "rc",
            NextVersionType::Beta => "beta",
            NextVersionType::Alpha => "alpha",
        }
    }

    /// Whether this kind produces a pre-release version.
    pub fn is_prerelease(&self) -> bool {
        matches!(
            self,
            NextVersionType::Rc | NextVersionType::Beta | NextVersionType::Alpha
        )
    }
}

/// Aggregate the strongest bump over all analyzed commits.
pub fn bump_from_commits(commits: &[AnalyzedCommit]) -> VersionBump {
    let mut bump = VersionBump::Unknown;

    for commit in commits {
        let entry_bump = if commit.breaking {
            VersionBump::Major
        } else {
            match commit.commit_type.as_str() {
                "feat" => VersionBump::Minor,
                "fix" => VersionBump::Patch,
                _ => VersionBump::Unknown,
            }
        };

        if entry_bump > bump {
            bump = entry_bump;
        }
    }

    bump
}

/// Computes next versions following SemVer 2.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemVer;

impl SemVer {
    /// Compute the next version string (with `v` prefix).
    ///
    /// The version anchor is the last stable release, falling back to the
    /// latest pre-release when the repository has never seen a stable tag.
    /// Pre-release kinds continue the `kind.N` counter of the latest tag
    /// when both the kind and the bumped core version match, and restart at
    /// 0 otherwise.
    pub fn next_version(
        &self,
        releases: &Releases,
        bump: VersionBump,
        next_version_type: NextVersionType,
    ) -> Result<String> {
        let latest = parse_with_default(releases.latest.as_ref())?;
        let stable = parse_with_default(releases.stable.as_ref())?;

        let mut next = if releases.stable.is_some() {
            stable
        } else {
            latest.clone()
        };

        match bump {
            VersionBump::Unknown => return Err(StateError::UnknownBump.into()),
            VersionBump::Patch => {
                next.patch += 1;
            }
            VersionBump::Minor => {
                next.minor += 1;
                next.patch = 0;
            }
            VersionBump::Major => {
                next.major += 1;
                next.minor = 0;
                next.patch = 0;
            }
        }
        next.pre = Prerelease::EMPTY;
        next.build = semver::BuildMetadata::EMPTY;

        if next_version_type.is_prerelease() {
            let kind = next_version_type.as_str();
            let mut counter = 0;

            let idents: Vec<&str> = latest.pre.as_str().split('.').collect();
            let same_core = latest.major == next.major
                && latest.minor == next.minor
                && latest.patch == next.patch;

            if !latest.pre.is_empty() && idents[0] == kind && same_core {
                if let Some(previous) = idents.get(1) {
                    counter = previous.parse::<u64>().map_err(|_| ParseError::PrereleaseFormat {
                        version: latest.to_string(),
                    })? + 1;
                }
            }

            next.pre =
                Prerelease::new(&format!("{kind}.{counter}")).map_err(|source| {
                    ParseError::Version {
                        version: format!("{kind}.{counter}"),
                        source,
                    }
                })?;
        }

        Ok(format!("v{next}"))
    }

    /// Whether the version string carries a pre-release segment.
    pub fn is_prerelease(&self, version: &str) -> bool {
        let raw = version.strip_prefix('v').unwrap_or(version);
        match Version::parse(raw) {
            Ok(parsed) => !parsed.pre.is_empty(),
            Err(_) => false,
        }
    }
}

fn parse_with_default(tag: Option<&Tag>) -> Result<Version> {
    let raw = tag.map(|t| t.name.as_str()).unwrap_or("v0.0.0");
    let stripped = raw.strip_prefix('v').unwrap_or(raw);

    Version::parse(stripped)
        .map_err(|source| {
            ParseError::Version {
                version: raw.to_string(),
                source,
            }
            .into()
        })
}
