//! Command-line interface.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "issue-mirror")]
#[command(about = "Mirror issue and pull-request lifecycle events", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file; defaults to .issue-mirror/config.yaml merged with local.yaml
    #[arg(short, long, global = true, env = "ISSUE_MIRROR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the webhook listener and/or the scheduled searcher
    Serve(commands::serve::ServeArgs),

    /// Load and validate the configuration, then print a summary
    CheckConfig,
}

/// Print a command failure and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        eprintln!("{body}");
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::parse_from(["issue-mirror", "serve", "--no-searcher"]);
        match cli.command {
            Commands::Serve(args) => {
                assert!(args.no_searcher);
                assert!(!args.no_listener);
            }
            Commands::CheckConfig => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::parse_from(["issue-mirror", "check-config", "--json", "-c", "custom.yaml"]);
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        assert!(matches!(cli.command, Commands::CheckConfig));
    }
}
