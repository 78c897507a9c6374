//! Named remote environments and their host lists.

use crate::error::{Result, RonError};
use crate::sink::OutputSink;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_port() -> u16 {
    22
}

/// Connection settings for one remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHostConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    /// Bastion host to hop through before reaching `host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_user: Option<String>,
    /// Private key file. The local agent is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
}

impl RemoteHostConfig {
    pub fn new(host: &str, port: u16, user: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            user: user.to_string(),
            proxy_host: None,
            proxy_port: None,
            proxy_user: None,
            identity_file: None,
        }
    }

    /// `host:port` of the target host.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Mapping of environment name to an ordered list of hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Remotes(pub BTreeMap<String, Vec<RemoteHostConfig>>);

impl Remotes {
    /// Parse the raw `remotes` section of a config. Empty text means none.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let remotes: Option<Remotes> =
            serde_yaml::from_str(text).map_err(|e| RonError::Yaml {
                path: "remotes".to_string(),
                message: e.to_string(),
                context: String::new(),
            })?;
        Ok(remotes.unwrap_or_default())
    }

    pub fn get(&self, env: &str) -> Option<&[RemoteHostConfig]> {
        self.0.get(env).map(|hosts| hosts.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Write every defined remote environment as YAML.
    pub fn list(&self, out: &OutputSink) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        let text = serde_yaml::to_string(self).map_err(|e| RonError::Yaml {
            path: "remotes".to_string(),
            message: e.to_string(),
            context: String::new(),
        })?;
        out.write_str(&text)?;
        Ok(())
    }
}
