//! Issue mirror CLI entry point.

use clap::Parser;

use issue_mirror::cli::commands::{self, check_config, serve};
use issue_mirror::cli::{handle_error, Cli, Commands};
use issue_mirror::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli.command, cli.config.as_deref(), cli.json).await {
        handle_error(&err, cli.json);
    }
}

async fn run(
    command: Commands,
    config_path: Option<&std::path::Path>,
    json_mode: bool,
) -> anyhow::Result<()> {
    let config = commands::load_config(config_path)?;

    match command {
        Commands::CheckConfig => check_config::execute(&config, json_mode),
        Commands::Serve(args) => {
            let _logger = LoggerImpl::init(&config.logging)?;
            serve::execute(args, config).await
        }
    }
}
