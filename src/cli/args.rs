//! Command line argument parsing.

use clap::{Parser, Subcommand, ValueEnum};

/// releaser-pleaser - automated releases on GitHub, GitLab and Forgejo
#[derive(Parser, Debug)]
#[command(
    name = "rp",
    version,
    about = "Automated releases for repositories on GitHub, GitLab and Forgejo"
)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile the release pull request and publish pending releases
    Run(RunArgs),
}

/// Flags of the `run` subcommand
#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Forge hosting the repository
    #[arg(long, value_enum)]
    pub forge: ForgeKind,

    /// Branch releases are cut from
    #[arg(long, default_value = "main")]
    pub branch: String,

    /// Repository owner (autodiscovered from the environment when unset)
    #[arg(long)]
    pub owner: Option<String>,

    /// Repository name (autodiscovered from the environment when unset)
    #[arg(long)]
    pub repo: Option<String>,

    /// Newline-separated list of files for the generic updater.
    /// Accepts \n escapes and may be wrapped in double quotes.
    #[arg(long)]
    pub extra_files: Option<String>,

    /// Comma-separated set of updaters. Entries prefixed with '-' remove
    /// an updater from the default set (changelog,generic).
    #[arg(long)]
    pub updaters: Option<String>,

    /// Forge API endpoint
    #[arg(long)]
    pub api_url: Option<String>,

    /// Forge API token (read from forge-specific environment variables when unset)
    #[arg(long)]
    pub api_token: Option<String>,

    /// Username for git-over-HTTP pushes
    #[arg(long)]
    pub username: Option<String>,
}

/// Supported forges
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForgeKind {
    /// github.com
    #[default]
    Github,
    /// gitlab.com or self-managed GitLab
    Gitlab,
    /// A Forgejo instance, e.g. codeberg.org
    Forgejo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_subcommand() {
        let args = Args::try_parse_from([
            "rp",
            "run",
            "--forge=github",
            "--owner=example",
            "--repo=project",
        ])
        .unwrap();

        let Command::Run(run) = args.command;
        assert_eq!(run.forge, ForgeKind::Github);
        assert_eq!(run.branch, "main");
        assert_eq!(run.owner.as_deref(), Some("example"));
        assert_eq!(run.repo.as_deref(), Some("project"));
    }

    #[test]
    fn forge_flag_is_required() {
        assert!(Args::try_parse_from(["rp", "run"]).is_err());
    }

    #[test]
    fn branch_flag_overrides_default() {
        let args =
            Args::try_parse_from(["rp", "run", "--forge=gitlab", "--branch=release-1.x"]).unwrap();
        let Command::Run(run) = args.command;
        assert_eq!(run.branch, "release-1.x");
        assert_eq!(run.forge, ForgeKind::Gitlab);
    }
}
