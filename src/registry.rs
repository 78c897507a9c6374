//! Target registry: one [`File`] per loaded config, in priority order.
//!
//! Targets are addressed as `[file:]name`, where `file` is the basename of
//! the source document without its extension. Without a prefix the first
//! file in priority order that defines the name wins.

use crate::config::{CONFIG_FILE_NAME, RawConfig};
use crate::env::{Env, EnvMap, os_envs};
use crate::error::{Result, RonError};
use crate::format::green;
use crate::remotes::{RemoteHostConfig, Remotes};
use crate::sink::OutputSink;
use crate::target::Target;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Split `[file:]name` into its file prefix and target name.
///
/// The prefix is reduced to its file stem, so `dir/proj.yaml:build` and
/// `proj:build` address the same target.
pub fn split_target(name: &str) -> (String, String) {
    match name.split_once(':') {
        None => (String::new(), name.to_string()),
        Some((prefix, target)) => (basename_of(prefix), target.to_string()),
    }
}

fn basename_of(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One loaded config document.
#[derive(Debug)]
pub struct File {
    pub filepath: String,
    basename: String,
    pub targets: BTreeMap<String, Target>,
    pub env: Arc<Env>,
    pub remotes: Remotes,
    pub raw: Arc<RawConfig>,
}

impl File {
    fn new(raw: Arc<RawConfig>, os_envs: Arc<EnvMap>, parent: Option<Arc<Env>>) -> Result<Self> {
        let mut targets: BTreeMap<String, Target> = if raw.targets.trim().is_empty() {
            BTreeMap::new()
        } else {
            let parsed: Option<BTreeMap<String, Target>> = serde_yaml::from_str(&raw.targets)
                .map_err(|e| RonError::Yaml {
                    path: raw.filepath.clone(),
                    message: e.to_string(),
                    context: String::new(),
                })?;
            parsed.unwrap_or_default()
        };
        for (name, target) in targets.iter_mut() {
            if target.name.is_empty() {
                target.name = name.clone();
            }
        }
        let remotes = Remotes::parse(&raw.remotes)?;
        let env = Arc::new(Env::new(Arc::clone(&raw), os_envs, parent)?);
        Ok(Self {
            filepath: raw.filepath.clone(),
            basename: basename_of(&raw.filepath),
            targets,
            env,
            remotes,
            raw,
        })
    }

    /// File name without directory or extension.
    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    fn header(&self) -> String {
        green(&format!("({}) {}\n", self.basename, self.filepath))
    }
}

/// All files of one run plus the remote hosts selected for it.
#[derive(Debug)]
pub struct Configs {
    files: Vec<File>,
    remote_env: Option<String>,
    remote_hosts: Vec<RemoteHostConfig>,
    stdout: OutputSink,
    stderr: OutputSink,
}

impl Configs {
    /// Build the registry against the current process environment.
    pub fn new(raws: Vec<RawConfig>, remote_env: Option<&str>) -> Result<Self> {
        Self::from_parts(raws, remote_env, os_envs())
    }

    /// Build the registry against an explicit OS environment.
    ///
    /// The first `ron.yaml` in the list becomes the root env of every file
    /// after it.
    pub fn from_parts(
        raws: Vec<RawConfig>,
        remote_env: Option<&str>,
        os_envs: EnvMap,
    ) -> Result<Self> {
        let os_envs = Arc::new(os_envs);
        let mut files = Vec::with_capacity(raws.len());
        let mut root: Option<Arc<Env>> = None;
        for raw in raws {
            let is_root = root.is_none()
                && Path::new(&raw.filepath).file_name() == Some(OsStr::new(CONFIG_FILE_NAME));
            let file = File::new(Arc::new(raw), Arc::clone(&os_envs), root.clone())?;
            debug!(file = %file.filepath, targets = file.targets.len(), "registered config file");
            if is_root {
                root = Some(Arc::clone(&file.env));
            }
            files.push(file);
        }

        let remote_env = remote_env.filter(|s| !s.is_empty()).map(str::to_string);
        let mut remote_hosts = Vec::new();
        if let Some(requested) = &remote_env {
            let (prefix, env) = split_target(requested);
            let found = files
                .iter()
                .filter(|f| prefix.is_empty() || f.basename == prefix)
                .find_map(|f| f.remotes.get(&env));
            if let Some(hosts) = found {
                remote_hosts = hosts.to_vec();
            }
            debug!(remote = %requested, hosts = remote_hosts.len(), "selected remote hosts");
        }

        Ok(Self {
            files,
            remote_env,
            remote_hosts,
            stdout: OutputSink::stdout(),
            stderr: OutputSink::stderr(),
        })
    }

    /// Send listings and command output to the given sinks.
    pub fn with_output(mut self, stdout: OutputSink, stderr: OutputSink) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn files(&self) -> &[File] {
        &self.files
    }

    pub fn file(&self, basename: &str) -> Option<&File> {
        self.files.iter().find(|f| f.basename == basename)
    }

    pub fn remote_env(&self) -> Option<&str> {
        self.remote_env.as_deref()
    }

    pub fn remote_hosts(&self) -> &[RemoteHostConfig] {
        &self.remote_hosts
    }

    pub fn stdout(&self) -> &OutputSink {
        &self.stdout
    }

    pub fn stderr(&self) -> &OutputSink {
        &self.stderr
    }

    /// Look up a target by `[file:]name`, returning it with its file.
    pub fn target(&self, name: &str) -> Option<(&File, &Target)> {
        let (prefix, target) = split_target(name);
        self.files
            .iter()
            .filter(|f| prefix.is_empty() || f.basename == prefix)
            .find_map(|f| f.target(&target).map(|t| (f, t)))
    }

    /// Like [`Configs::target`], but a miss is an error.
    pub fn require(&self, name: &str) -> Result<(&File, &Target)> {
        self.target(name)
            .ok_or_else(|| RonError::TargetNotFound(name.to_string()))
    }

    /// List targets of every file, optionally filtered by
    /// `[file:]glob-pattern`.
    pub fn list(&self, verbose: bool, fuzzy: &str) -> Result<()> {
        let (prefix, pattern) = split_target(fuzzy);
        let pattern = if pattern.is_empty() {
            None
        } else {
            Some(glob::Pattern::new(&pattern).map_err(|e| {
                RonError::TargetNotFound(format!("{}: {}", fuzzy, e.msg))
            })?)
        };
        for file in &self.files {
            if !prefix.is_empty() && file.basename != prefix {
                continue;
            }
            let width = file.targets.keys().map(|k| k.len()).max().unwrap_or(0);
            self.stdout.write_str(&file.header())?;
            for (name, target) in &file.targets {
                if let Some(pattern) = &pattern
                    && !pattern.matches(name)
                {
                    continue;
                }
                target.list(verbose, width, &self.stdout)?;
            }
            self.stdout.write_str(&green("---\n\n"))?;
        }
        Ok(())
    }

    /// Every `file:target` name, sorted, space separated.
    pub fn list_clean(&self) -> Result<()> {
        let mut names: Vec<String> = self
            .files
            .iter()
            .flat_map(|f| f.targets.keys().map(move |k| format!("{}:{}", f.basename, k)))
            .collect();
        names.sort();
        for name in names {
            self.stdout.write_str(&format!("{} ", name))?;
        }
        Ok(())
    }

    /// Resolved envs of every file.
    pub fn list_envs(&self) -> Result<()> {
        for file in &self.files {
            self.stdout.write_str(&file.header())?;
            file.env.list(&self.stdout)?;
            self.stdout.write_str(&green("---\n\n"))?;
        }
        Ok(())
    }

    /// Unprocessed `envs` YAML of every file.
    pub fn print_raw_envs(&self) -> Result<()> {
        for file in &self.files {
            self.stdout.write_str(&file.header())?;
            file.env.print_raw(&self.stdout)?;
            self.stdout.write_str(&green("---\n\n"))?;
        }
        Ok(())
    }

    /// Remote environments of every file. A file whose remotes cannot be
    /// printed reports to stderr and listing continues.
    pub fn list_remotes(&self) -> Result<()> {
        for file in &self.files {
            self.stdout.write_str(&file.header())?;
            if let Err(e) = file.remotes.list(&self.stdout) {
                self.stderr.write_str(&crate::format::red(&e.to_string()))?;
            }
            self.stdout.write_str(&green("---\n\n"))?;
        }
        Ok(())
    }
}
