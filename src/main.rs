//! releaser-pleaser binary.

use std::process;

use clap::Parser;
use log::{error, info};

use releaser_pleaser::cli::{self, Args};
use releaser_pleaser::error::Error;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to create tokio runtime: {err}");
            process::exit(1);
        }
    };

    let exit_code = runtime.block_on(async_main());
    process::exit(exit_code);
}

async fn async_main() -> i32 {
    let args = Args::parse();

    tokio::select! {
        result = cli::execute(args) => match result {
            Ok(()) => 0,
            Err(err) => {
                error!("{err}");
                1
            }
        },
        _ = shutdown_signal() => {
            info!("received shutdown signal, stopping");
            error!("{}", Error::Canceled);
            1
        }
    }
}

/// Completes on the first SIGINT or SIGTERM.
///
/// CI systems cancel jobs with either signal depending on the platform
/// (GitHub Actions sends SIGINT first, GitLab CI SIGTERM), so both cancel
/// the run. A repeated signal falls through to the runtime's default
/// handling once this future resolved.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut interrupt =
            signal(SignalKind::interrupt()).expect("installing SIGINT handler cannot fail");
        let mut terminate =
            signal(SignalKind::terminate()).expect("installing SIGTERM handler cannot fail");

        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
