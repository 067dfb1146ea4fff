//! The `run` subcommand: wires flags and environment into a reconciler.

use crate::cli::args::{ForgeKind, RunArgs};
use crate::commitparser::ConventionalCommits;
use crate::error::{CliError, Result};
use crate::forge::{Forge, Forgejo, ForgejoOptions, GitHub, GitHubOptions, GitLab, GitLabOptions};
use crate::reconciler::Reconciler;
use crate::templates;
use crate::updater::{self, DEFAULT_UPDATERS, KNOWN_UPDATERS, Updater};
use crate::versioning::SemVer;

/// Execute the `run` subcommand.
pub async fn run(args: RunArgs) -> Result<()> {
    // Broken embedded templates surface here instead of mid-reconciliation.
    templates::init()?;

    let extra_files = parse_extra_files(args.extra_files.as_deref().unwrap_or_default());
    let updaters = resolve_updaters(args.updaters.as_deref(), &extra_files)?;
    let forge = build_forge(&args)?;

    let reconciler = Reconciler::new(
        forge,
        args.branch,
        Box::new(ConventionalCommits),
        SemVer,
        updaters,
    );

    reconciler.run().await
}

fn build_forge(args: &RunArgs) -> Result<Box<dyn Forge>> {
    let forge: Box<dyn Forge> = match args.forge {
        ForgeKind::Github => Box::new(GitHub::new(GitHubOptions {
            owner: args.owner.clone().unwrap_or_default(),
            repo: args.repo.clone().unwrap_or_default(),
            base_branch: args.branch.clone(),
            api_url: args.api_url.clone(),
            api_token: args.api_token.clone(),
            username: args.username.clone(),
        })?),
        ForgeKind::Gitlab => {
            let project_path = match (&args.owner, &args.repo) {
                (Some(owner), Some(repo)) => format!("{owner}/{repo}"),
                // Autodiscovered from the GitLab CI environment
                _ => String::new(),
            };
            Box::new(GitLab::new(GitLabOptions {
                project_path,
                base_branch: args.branch.clone(),
                api_url: args.api_url.clone(),
                api_token: args.api_token.clone(),
                project_url: None,
            })?)
        }
        ForgeKind::Forgejo => {
            let base_url = args.api_url.clone().ok_or_else(|| CliError::InvalidArguments {
                reason: "--api-url is required for forgejo".to_string(),
            })?;
            let (owner, repo) = match (&args.owner, &args.repo) {
                (Some(owner), Some(repo)) => (owner.clone(), repo.clone()),
                _ => {
                    return Err(CliError::InvalidArguments {
                        reason: "--owner and --repo are required for forgejo".to_string(),
                    }
                    .into());
                }
            };
            Box::new(Forgejo::new(ForgejoOptions {
                base_url,
                owner,
                repo,
                base_branch: args.branch.clone(),
                api_token: args.api_token.clone(),
                username: args.username.clone(),
            })?)
        }
    };

    Ok(forge)
}

/// Parse the `--extra-files` flag: a newline-separated path list that may
/// use literal `\n` escapes and may be wrapped in double quotes.
pub(crate) fn parse_extra_files(input: &str) -> Vec<String> {
    let unquoted = input
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(input);

    unquoted
        .replace("\\n", "\n")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve the `--updaters` flag into constructed updaters.
///
/// The set starts out as [`DEFAULT_UPDATERS`]; plain entries add an
/// updater, entries prefixed with `-` remove one.
pub(crate) fn resolve_updaters(
    flag: Option<&str>,
    extra_files: &[String],
) -> Result<Vec<Box<dyn Updater>>> {
    let mut names: Vec<&str> = DEFAULT_UPDATERS.to_vec();

    for raw in flag.unwrap_or_default().split(',') {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }

        let (name, remove) = match entry.strip_prefix('-') {
            Some(name) => (name, true),
            None => (entry, false),
        };

        if !KNOWN_UPDATERS.contains(&name) {
            return Err(CliError::InvalidArguments {
                reason: format!("unknown updater {name:?}"),
            }
            .into());
        }

        if remove {
            names.retain(|existing| *existing != name);
        } else if !names.contains(&name) {
            names.push(name);
        }
    }

    Ok(names
        .into_iter()
        .filter_map(|name| updater::by_name(name, extra_files))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_files_split_on_newlines() {
        assert_eq!(
            parse_extra_files("version.txt\ncharts/values.yaml"),
            vec!["version.txt", "charts/values.yaml"]
        );
    }

    #[test]
    fn extra_files_accept_escapes_and_quotes() {
        assert_eq!(
            parse_extra_files("\"version.txt\\ndocs/install.md\""),
            vec!["version.txt", "docs/install.md"]
        );
    }

    #[test]
    fn extra_files_empty_input() {
        assert!(parse_extra_files("").is_empty());
        assert!(parse_extra_files("\n\n").is_empty());
    }

    #[test]
    fn updaters_default_set() {
        let updaters = resolve_updaters(None, &[]).unwrap();
        assert_eq!(updaters.len(), 2);
    }

    #[test]
    fn updaters_add_and_remove() {
        let updaters = resolve_updaters(Some("-generic,helmchart"), &[]).unwrap();
        let files: Vec<_> = updaters
            .iter()
            .flat_map(|updater| updater.files())
            .collect();
        assert!(files.contains(&std::path::PathBuf::from("CHANGELOG.md")));
        assert!(files.contains(&std::path::PathBuf::from("Chart.yaml")));
        assert_eq!(updaters.len(), 2);
    }

    #[test]
    fn unknown_updater_is_rejected() {
        assert!(resolve_updaters(Some("cargo"), &[]).is_err());
    }
}
