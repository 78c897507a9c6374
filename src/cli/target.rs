//! Target subcommand for ron CLI
//!
//! Loads the configuration cascade, then either lists what it found or runs
//! the named targets in order.

use crate::config::{ConfigLoader, ConfigPaths};
use crate::error::Result;
use crate::execute::CancelToken;
use crate::make::{Make, RunOptions};
use crate::registry::Configs;
use clap::Args;
use std::sync::Arc;
use tracing::{info, warn};

/// Arguments for the target subcommand
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Default config file, local path or URL (default: built in)
    #[arg(long, value_name = "PATH")]
    pub default: Option<String>,

    /// Override config file, local path or URL
    ///
    /// Without it the nearest ron.yaml in the working directory or a parent
    /// is used, and targets run from that file's directory.
    #[arg(long, value_name = "PATH")]
    pub yaml: Option<String>,

    /// List the resolved envs of every file
    #[arg(long)]
    pub envs: bool,

    /// Print the unprocessed envs of every file
    #[arg(long)]
    pub raw_envs: bool,

    /// List targets, optionally filtered by [file:]glob
    #[arg(short, long, value_name = "PATTERN", num_args = 0..=1, default_missing_value = "")]
    pub list: Option<String>,

    /// List every file:target name for shell completion
    #[arg(long)]
    pub list_clean: bool,

    /// List the remote environments of every file
    #[arg(long)]
    pub remotes: bool,

    /// Verbose listings
    #[arg(short, long)]
    pub verbose: bool,

    /// Print each command with variables expanded before running it
    #[arg(long)]
    pub debug: bool,

    /// Run on the hosts of a remote environment, [file:]env
    #[arg(short, long, value_name = "ENV")]
    pub remote: Option<String>,

    /// Fail when any remote host fails
    #[arg(long)]
    pub strict_remote: bool,

    /// Skip the ~/.ron directory
    #[arg(long)]
    pub no_home: bool,

    /// Forward stdin to remote sessions
    #[arg(long)]
    pub stdin: bool,

    /// Targets to run, [file:]name
    #[arg(value_name = "TARGET")]
    pub names: Vec<String>,
}

impl TargetArgs {
    fn paths(&self) -> Result<ConfigPaths> {
        let mut paths = ConfigPaths::discover()?
            .with_override(self.yaml.clone())
            .with_default(self.default.clone());
        if self.no_home {
            paths = paths.without_home();
        }
        Ok(paths)
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            debug: self.debug,
            strict_remote: self.strict_remote,
            forward_stdin: self.stdin,
        }
    }

    /// Pattern for `--list`: its own value, else the names joined.
    fn list_pattern(&self) -> Option<String> {
        self.list.as_ref().map(|pattern| {
            if pattern.is_empty() {
                self.names.join(" ")
            } else {
                pattern.clone()
            }
        })
    }
}

/// Execute the target subcommand.
pub async fn run(args: &TargetArgs, cancel: CancelToken) -> Result<()> {
    let loaded = ConfigLoader::new(args.paths()?).load().await?;
    if let Some(dir) = &loaded.found_dir {
        info!(dir = %dir.display(), "changing working directory");
        std::env::set_current_dir(dir)?;
    }

    let configs = Configs::new(loaded.configs, args.remote.as_deref())?;

    if args.raw_envs {
        return configs.print_raw_envs();
    }
    if args.envs {
        return configs.list_envs();
    }
    if args.remotes {
        return configs.list_remotes();
    }
    if args.list_clean {
        return configs.list_clean();
    }
    if let Some(pattern) = args.list_pattern() {
        return configs.list(args.verbose, &pattern);
    }
    if args.names.is_empty() {
        return configs.list(args.verbose, "");
    }

    if let Some(remote) = configs.remote_env()
        && configs.remote_hosts().is_empty()
    {
        warn!(remote, "no hosts defined for remote env, running locally");
    }

    let make = Make::new(Arc::new(configs))
        .with_options(args.run_options())
        .with_cancel(cancel);
    make.run(&args.names).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_pattern() {
        let mut args = TargetArgs {
            list: Some(String::new()),
            names: vec!["proj:b*".to_string()],
            ..TargetArgs::default()
        };
        assert_eq!(args.list_pattern().as_deref(), Some("proj:b*"));
        args.list = Some("t*".to_string());
        assert_eq!(args.list_pattern().as_deref(), Some("t*"));
        args.list = None;
        assert_eq!(args.list_pattern(), None);
    }

    #[test]
    fn test_run_options() {
        let args = TargetArgs {
            debug: true,
            stdin: true,
            ..TargetArgs::default()
        };
        let options = args.run_options();
        assert!(options.debug);
        assert!(options.forward_stdin);
        assert!(!options.strict_remote);
    }
}
