//! Remote execution of a target's command on one host.
//!
//! A [`RemoteConnector`] owns the transport. The executor calls it once per
//! configured host, concurrently, and only for the target's own command.

pub mod ssh;

pub use ssh::SshConnector;

use crate::env::EnvMap;
use crate::error::Result;
use crate::format::{green, red};
use crate::remotes::RemoteHostConfig;
use crate::sink::OutputSink;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

/// The command sent to every host of a fan-out.
#[derive(Debug, Clone)]
pub struct RemoteCommand {
    pub target: String,
    pub command: String,
    /// Resolved env of the target's file, forwarded into the session.
    pub envs: Arc<EnvMap>,
    /// Pipe local stdin into the session.
    pub forward_stdin: bool,
}

#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Run `cmd` on `host`, streaming host-tagged lines to the sinks.
    ///
    /// Returns the remote exit status. Failing to reach the host is a
    /// [`crate::error::RonError::RemoteConnect`].
    async fn run(
        &self,
        host: &RemoteHostConfig,
        cmd: &RemoteCommand,
        stdout: OutputSink,
        stderr: OutputSink,
    ) -> Result<i32>;
}

/// Prefix written before each stdout line of `host`.
pub fn stdout_prefix(host: &str) -> String {
    green(&format!("{}]", host))
}

/// Prefix written before each stderr line of `host`.
pub fn stderr_prefix(host: &str) -> String {
    red(&format!("{}]", host))
}

/// Copy `reader` to `sink` line by line, each line prefixed.
pub async fn tag_lines<R>(reader: R, prefix: String, sink: OutputSink)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches('\n').trim_end_matches('\r');
                if let Err(e) = sink.write_str(&format!("{} {}\n", prefix, line)) {
                    warn!("unable to write remote output: {}", e);
                    return;
                }
            }
            Err(e) => {
                warn!("unable to read remote output: {}", e);
                return;
            }
        }
    }
}
