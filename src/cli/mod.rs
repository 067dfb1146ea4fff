//! Command line front-end.

mod args;
mod run;

pub use args::{Args, Command, ForgeKind, RunArgs};

use crate::error::Result;

/// Dispatch a parsed command line.
pub async fn execute(args: Args) -> Result<()> {
    match args.command {
        Command::Run(run_args) => run::run(run_args).await,
    }
}
