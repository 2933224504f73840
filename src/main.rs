mod cli;
mod commands;
mod config;
mod error;
mod jobs;
mod logging;
mod openai;
mod orchestrator;
mod output;
mod poller;
mod retry;
#[cfg(test)]
mod testing;
mod ui;

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use config::SoraConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match SoraConfig::load() {
        Ok(config) => commands::run(cli.command, &config).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
