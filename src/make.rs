//! Target execution.
//!
//! Locally a target runs its `before` targets, its own command and then its
//! `after` targets, stopping at the first failure. With remote hosts
//! selected, only the target's own command runs, once per host,
//! concurrently.

use crate::env::{Env, ResolvedEnv};
use crate::error::{HostFailure, Result, RonError};
use crate::execute::{CancelToken, run_shell};
use crate::format::{blue, red};
use crate::registry::Configs;
use crate::remote::{RemoteCommand, RemoteConnector, SshConnector};
use crate::remotes::RemoteHostConfig;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Print each command, with variables expanded, before running it.
    pub debug: bool,
    /// Fail the run when any remote host fails.
    pub strict_remote: bool,
    /// Pipe local stdin into remote sessions.
    pub forward_stdin: bool,
}

/// Outcome of one remote fan-out.
#[derive(Debug, Default)]
pub struct RemoteReport {
    pub target: String,
    pub succeeded: Vec<String>,
    pub failures: Vec<HostFailure>,
}

impl RemoteReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Make {
    configs: Arc<Configs>,
    connector: Arc<dyn RemoteConnector>,
    options: RunOptions,
    cancel: CancelToken,
}

impl Make {
    pub fn new(configs: Arc<Configs>) -> Self {
        Self {
            configs,
            connector: Arc::new(SshConnector::new()),
            options: RunOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn RemoteConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn configs(&self) -> &Configs {
        &self.configs
    }

    /// Run each named target in order.
    ///
    /// Local runs stop at the first failing target. Remote runs continue
    /// past failing hosts unless `strict_remote` is set.
    pub async fn run<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        let remote = !self.configs.remote_hosts().is_empty();
        for name in names {
            let name = name.as_ref();
            self.configs.require(name)?;
            if remote {
                let report = self.run_remote(name).await?;
                if self.options.strict_remote && !report.is_success() {
                    return Err(RonError::RemoteHosts(report.failures));
                }
            } else {
                self.run_target(name).await?;
            }
        }
        Ok(())
    }

    /// Run one target locally with its before and after targets.
    pub async fn run_target(&self, name: &str) -> Result<()> {
        let mut stack = Vec::new();
        self.run_in_stack(name.to_string(), &mut stack).await
    }

    fn run_in_stack<'a>(&'a self, name: String, stack: &'a mut Vec<String>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let (file, target) = self.configs.require(&name)?;
            let key = format!("{}:{}", file.basename(), target.name);
            if stack.contains(&key) {
                let mut chain = stack.clone();
                chain.push(key);
                return Err(RonError::Cycle { chain });
            }
            stack.push(key);

            // Tier 1: before
            for dep in &target.before {
                if *dep == target.name {
                    continue;
                }
                self.run_in_stack(dep.clone(), stack).await?;
            }

            // Tier 2: own command
            let envs = resolve_env(&file.env).await?;
            if self.options.debug {
                self.echo_command(&target.cmd, &envs.vars)?;
            }
            debug!(target = %name, file = %file.filepath, "running target");
            let status = run_shell(
                &target.cmd,
                &envs.vars,
                self.configs.stdout(),
                self.configs.stderr(),
                &self.cancel,
            )
            .await?;
            if status != 0 {
                debug!(target = %name, status, "target failed");
                return Err(RonError::Execution {
                    target: target.name.clone(),
                    status,
                });
            }

            // Tier 3: after
            for dep in &target.after {
                if *dep == target.name {
                    continue;
                }
                self.run_in_stack(dep.clone(), stack).await?;
            }

            stack.pop();
            Ok(())
        })
    }

    fn echo_command(&self, cmd: &str, envs: &BTreeMap<String, String>) -> Result<()> {
        let expanded = shellexpand::env_with_context_no_errors(cmd, |key: &str| {
            Some(envs.get(key).cloned().unwrap_or_default())
        });
        let line = format!("\t{}", expanded.trim_end().replace('\n', "\n\t"));
        self.configs.stdout().write_str(&format!("{}\n", blue(&line)))?;
        Ok(())
    }

    /// Run a target's own command on every selected remote host.
    ///
    /// Every host runs to completion. Failures are written to the error
    /// sink and collected in the report.
    pub async fn run_remote(&self, name: &str) -> Result<RemoteReport> {
        let (file, target) = self.configs.require(name)?;
        let envs = resolve_env(&file.env).await?;
        let command = Arc::new(RemoteCommand {
            target: target.name.clone(),
            command: target.cmd.clone(),
            envs: Arc::new(envs.vars.clone()),
            forward_stdin: self.options.forward_stdin,
        });

        let hosts: Vec<RemoteHostConfig> = self.configs.remote_hosts().to_vec();
        debug!(target = %name, hosts = hosts.len(), "starting remote fan-out");

        let mut set = JoinSet::new();
        for host in hosts {
            let connector = Arc::clone(&self.connector);
            let command = Arc::clone(&command);
            let stdout = self.configs.stdout().clone();
            let stderr = self.configs.stderr().clone();
            set.spawn(async move {
                let result = connector.run(&host, &command, stdout, stderr).await;
                (host.host, result)
            });
        }

        let mut report = RemoteReport {
            target: target.name.clone(),
            ..RemoteReport::default()
        };
        while let Some(joined) = set.join_next().await {
            let (host, result) = match joined {
                Ok(done) => done,
                Err(e) => (
                    "unknown".to_string(),
                    Err(RonError::Io(std::io::Error::other(e.to_string()))),
                ),
            };
            let error = match result {
                Ok(0) => {
                    report.succeeded.push(host);
                    continue;
                }
                Ok(status) => RonError::Execution {
                    target: target.name.clone(),
                    status,
                },
                Err(e) => e,
            };
            warn!(host = %host, target = %name, "remote host failed: {}", error);
            self.configs
                .stderr()
                .write_str(&format!("{} {}\n", red(&format!("{}]", host)), error))?;
            report.failures.push(HostFailure { host, error });
        }
        report.succeeded.sort();
        Ok(report)
    }
}

/// Resolve `env` off the async workers, since `+` commands block.
async fn resolve_env(env: &Arc<Env>) -> Result<Arc<ResolvedEnv>> {
    let env = Arc::clone(env);
    tokio::task::spawn_blocking(move || env.resolve())
        .await
        .map_err(|e| RonError::Io(std::io::Error::other(e.to_string())))?
}
