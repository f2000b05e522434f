use std::process::ExitCode;

use clap::Parser;
use labtrace::cli::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    labtrace::init_tracing();
    tracing::debug!(version = labtrace::config::APP_VERSION, "{} starting", labtrace::config::APP_NAME);

    match cli::run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
