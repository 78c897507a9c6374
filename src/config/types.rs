//! Configuration document types.

use crate::error::{Result, RonError};
use crate::remotes::Remotes;
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One configuration document as written by the user.
///
/// `envs` stays an untyped YAML list so that declaration order survives the
/// round trip into [`RawConfig`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub envs: Option<serde_yaml::Value>,
    #[serde(default)]
    pub remotes: Option<Remotes>,
    #[serde(default)]
    pub targets: Option<BTreeMap<String, Target>>,
}

/// The raw sections of one loaded config source.
///
/// Each section is re-serialized YAML text; parsing into envs, remotes and
/// targets happens later, when the registry is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConfig {
    /// Absolute path, URL, or `builtin:` provenance of the source.
    pub filepath: String,
    pub envs: String,
    pub remotes: String,
    pub targets: String,
}

impl RawConfig {
    pub fn from_config_file(filepath: impl Into<String>, file: ConfigFile) -> Result<Self> {
        let filepath = filepath.into();
        Ok(Self {
            envs: section_text(&filepath, file.envs.as_ref())?,
            remotes: section_text(&filepath, file.remotes.as_ref())?,
            targets: section_text(&filepath, file.targets.as_ref())?,
            filepath,
        })
    }

    /// Build a raw config directly from section text. Used by tests and by
    /// callers embedding their own documents.
    pub fn new(filepath: &str, envs: &str, remotes: &str, targets: &str) -> Self {
        Self {
            filepath: filepath.to_string(),
            envs: envs.trim().to_string(),
            remotes: remotes.trim().to_string(),
            targets: targets.trim().to_string(),
        }
    }
}

fn section_text<T: Serialize>(path: &str, section: Option<&T>) -> Result<String> {
    match section {
        None => Ok(String::new()),
        Some(value) => serde_yaml::to_string(value)
            .map(|s| s.trim().to_string())
            .map_err(|e| RonError::Yaml {
                path: path.to_string(),
                message: e.to_string(),
                context: String::new(),
            }),
    }
}
