//! CLI command definitions for ron
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod target;

use clap::{Parser, Subcommand};
use target::TargetArgs;

/// Make-like task runner driven by cascading YAML files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(long, default_value = "2", global = true)]
    pub log: String,

    /// Log filter when RON_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run or inspect targets
    #[command(visible_alias = "t")]
    Target(TargetArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_alias() {
        let cli = Cli::try_parse_from(["ron", "t", "-l", "--", "build"]).unwrap();
        let Command::Target(args) = cli.command;
        assert_eq!(args.list.as_deref(), Some(""));
        assert_eq!(args.names, vec!["build".to_string()]);
        assert_eq!(cli.log, "2");
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_parse_target_flags() {
        let cli = Cli::try_parse_from([
            "ron",
            "--log",
            "off",
            "target",
            "--yaml",
            "other.yaml",
            "--remote",
            "remotes:staging",
            "--strict-remote",
            "--debug",
            "deploy",
            "notify",
        ])
        .unwrap();
        let Command::Target(args) = cli.command;
        assert_eq!(cli.log, "off");
        assert_eq!(args.yaml.as_deref(), Some("other.yaml"));
        assert_eq!(args.remote.as_deref(), Some("remotes:staging"));
        assert!(args.strict_remote);
        assert!(args.debug);
        assert_eq!(args.names, vec!["deploy", "notify"]);
    }
}
