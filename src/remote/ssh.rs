//! OpenSSH client transport.
//!
//! Each run spawns one `ssh` process: public-key auth only, a forced
//! pseudo-terminal, the bastion hop as a `ProxyCommand`, and the resolved
//! env forwarded through `SetEnv`.

use super::{RemoteCommand, RemoteConnector, stderr_prefix, stdout_prefix, tag_lines};
use crate::env::EnvMap;
use crate::error::{Result, RonError};
use crate::execute::exit_code;
use crate::remotes::RemoteHostConfig;
use crate::sink::OutputSink;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Exit status OpenSSH reserves for its own failures.
const SSH_ERROR_STATUS: i32 = 255;

#[derive(Debug, Clone)]
pub struct SshConnector {
    program: String,
    connect_timeout_secs: u32,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl SshConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another client binary with the same command line.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn common_args(&self, args: &mut Vec<String>) {
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ]);
    }

    /// Command line for running `cmd` on `host`.
    pub fn build_args(&self, host: &RemoteHostConfig, cmd: &RemoteCommand) -> Vec<String> {
        let mut args = vec!["-tt".to_string()];

        if let Some(identity_file) = &host.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }
        args.push("-p".to_string());
        args.push(host.port.to_string());
        self.common_args(&mut args);

        if let Some(proxy_host) = host.proxy_host.as_deref().filter(|h| !h.is_empty()) {
            args.push("-o".to_string());
            args.push(format!("ProxyCommand={}", self.proxy_command(host, proxy_host)));
        }

        if let Some(set_env) = set_env_option(&cmd.envs) {
            args.push("-o".to_string());
            args.push(set_env);
        }

        args.push(destination(&host.user, &host.host));
        args.push(cmd.command.clone());
        args
    }

    fn proxy_command(&self, host: &RemoteHostConfig, proxy_host: &str) -> String {
        let mut parts = vec![self.program.clone()];
        if let Some(identity_file) = &host.identity_file {
            parts.push(format!("-i {}", shell_quote(identity_file)));
        }
        parts.push(format!("-p {}", host.proxy_port.unwrap_or(22)));
        let mut opts = Vec::new();
        self.common_args(&mut opts);
        parts.push(opts.join(" "));
        parts.push("-W %h:%p".to_string());
        let user = host.proxy_user.as_deref().unwrap_or("");
        parts.push(destination(user, proxy_host));
        parts.join(" ")
    }
}

fn destination(user: &str, host: &str) -> String {
    if user.is_empty() {
        host.to_string()
    } else {
        format!("{}@{}", user, host)
    }
}

/// Single-quote `s` for the shell that runs `ProxyCommand`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// A single `SetEnv=K="v" ...` option carrying every variable.
fn set_env_option(envs: &EnvMap) -> Option<String> {
    if envs.is_empty() {
        return None;
    }
    let pairs: Vec<String> = envs
        .iter()
        .map(|(k, v)| {
            let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
            format!("{}=\"{}\"", k, escaped)
        })
        .collect();
    Some(format!("SetEnv={}", pairs.join(" ")))
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn run(
        &self,
        host: &RemoteHostConfig,
        cmd: &RemoteCommand,
        stdout: OutputSink,
        stderr: OutputSink,
    ) -> Result<i32> {
        let args = self.build_args(host, cmd);
        debug!(host = %host.address(), target = %cmd.target, "starting remote session");

        let stdin = if cmd.forward_stdin {
            Stdio::inherit()
        } else {
            Stdio::null()
        };
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RonError::remote_connect(&host.host, e))?;

        let out_task = child
            .stdout
            .take()
            .map(|s| tokio::spawn(tag_lines(s, stdout_prefix(&host.host), stdout)));
        let err_task = child
            .stderr
            .take()
            .map(|s| tokio::spawn(tag_lines(s, stderr_prefix(&host.host), stderr)));

        let status = child
            .wait()
            .await
            .map_err(|e| RonError::remote_connect(&host.host, e))?;
        for task in [out_task, err_task].into_iter().flatten() {
            let _ = task.await;
        }

        let status = exit_code(status);
        debug!(host = %host.address(), status, "remote session finished");
        if status == SSH_ERROR_STATUS {
            return Err(RonError::RemoteConnect {
                host: host.host.clone(),
                message: format!("{} exited with status {}", self.program, status),
            });
        }
        Ok(status)
    }
}
