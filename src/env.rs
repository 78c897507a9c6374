//! Environment variable resolution for one config file.
//!
//! An [`Env`] is built from the raw `envs` section of a file: an ordered list
//! of single-key maps, so declaration order is kept. Resolution runs once,
//! lazily, on first access:
//!
//! 1. resolve the root env (the `ron.yaml` file) first, if this env has one
//! 2. overlay the OS environment on the declared values
//! 3. in declaration order, run `+` commands and expand `$VAR`/`${VAR}`
//! 4. backfill declared root keys whose local value ended up empty
//!
//! Lookups check the local map first and then walk up to the root env.

use crate::config::RawConfig;
use crate::error::{Result, RonError};
use crate::execute::capture_shell;
use crate::format::{green, pad_left};
use crate::sink::OutputSink;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Values starting with this character are shell commands whose trimmed
/// stdout becomes the value.
pub const EXEC_SENTINEL: char = '+';

pub type EnvMap = BTreeMap<String, String>;

/// Split `KEY=VALUE` pairs on the first `=`.
pub fn parse_os_envs<I, S>(pairs: I) -> EnvMap
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    pairs
        .into_iter()
        .filter_map(|pair| {
            let pair = pair.as_ref();
            let (k, v) = pair.split_once('=')?;
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}

/// The OS environment of the current process.
pub fn os_envs() -> EnvMap {
    std::env::vars().collect()
}

/// Fully resolved variables of one env.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEnv {
    /// Every variable passed to commands: OS environment plus declarations.
    pub vars: EnvMap,
    /// Declared keys in first-seen order, root keys first.
    pub key_order: Vec<String>,
}

impl ResolvedEnv {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

pub struct Env {
    raw: Arc<RawConfig>,
    /// Declared values, last declaration wins.
    declared: EnvMap,
    /// Declared keys in first-seen order.
    key_order: Vec<String>,
    os_envs: Arc<EnvMap>,
    parent: Option<Arc<Env>>,
    resolved: Mutex<Option<Arc<ResolvedEnv>>>,
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("filepath", &self.raw.filepath)
            .field("key_order", &self.key_order)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl Env {
    /// Parse the raw `envs` section. Nothing is executed until the env is
    /// resolved.
    pub fn new(raw: Arc<RawConfig>, os_envs: Arc<EnvMap>, parent: Option<Arc<Env>>) -> Result<Self> {
        let (declared, key_order) = parse_declarations(&raw.envs)?;
        Ok(Self {
            raw,
            declared,
            key_order,
            os_envs,
            parent,
            resolved: Mutex::new(None),
        })
    }

    pub fn filepath(&self) -> &str {
        &self.raw.filepath
    }

    pub fn parent(&self) -> Option<&Arc<Env>> {
        self.parent.as_ref()
    }

    /// Resolve this env, running it at most once.
    pub fn resolve(&self) -> Result<Arc<ResolvedEnv>> {
        let mut guard = self
            .resolved
            .lock()
            .map_err(|_| RonError::EnvYaml("env state poisoned".to_string()))?;
        if let Some(resolved) = guard.as_ref() {
            return Ok(Arc::clone(resolved));
        }
        let parent = match &self.parent {
            Some(parent) => Some(parent.resolve()?),
            None => None,
        };
        let resolved = Arc::new(self.process(parent.as_deref())?);
        *guard = Some(Arc::clone(&resolved));
        Ok(resolved)
    }

    /// Alias of [`Env::resolve`] returning the full variable map.
    pub fn config(&self) -> Result<EnvMap> {
        Ok(self.resolve()?.vars.clone())
    }

    /// Look up one variable, resolving the env first if needed.
    ///
    /// A value that still starts with `+` (an OS variable nobody declared)
    /// is executed on demand.
    pub fn getenv(&self, key: &str) -> Result<String> {
        let resolved = self.resolve()?;
        let value = resolved
            .get(key)
            .map(str::to_string)
            .or_else(|| self.parent_value(key))
            .unwrap_or_default();
        match value.strip_prefix(EXEC_SENTINEL) {
            Some(script) => run_sentinel(key, script, &resolved.vars),
            None => Ok(value),
        }
    }

    fn parent_value(&self, key: &str) -> Option<String> {
        let mut next = self.parent.as_ref();
        while let Some(env) = next {
            if let Ok(resolved) = env.resolve()
                && let Some(v) = resolved.get(key)
            {
                return Some(v.to_string());
            }
            next = env.parent.as_ref();
        }
        None
    }

    /// Declared keys in first-seen order (without root keys).
    pub fn key_order(&self) -> &[String] {
        &self.key_order
    }

    fn process(&self, parent: Option<&ResolvedEnv>) -> Result<ResolvedEnv> {
        debug!(file = %self.raw.filepath, "resolving envs");
        let mut key_order: Vec<String> = Vec::new();
        let mut vars = EnvMap::new();

        // Root keys this file does not declare are seeded as final values.
        let mut seeded: HashSet<String> = HashSet::new();
        if let Some(parent) = parent {
            for key in &parent.key_order {
                if !self.declared.contains_key(key) {
                    if let Some(v) = parent.get(key) {
                        vars.insert(key.clone(), v.to_string());
                    }
                    seeded.insert(key.clone());
                    key_order.push(key.clone());
                }
            }
        }
        for key in &self.key_order {
            if let Some(v) = self.declared.get(key) {
                vars.insert(key.clone(), v.clone());
            }
            key_order.push(key.clone());
        }

        for (k, v) in self.os_envs.iter() {
            vars.insert(k.clone(), v.clone());
        }

        let mut done: HashSet<String> = HashSet::new();
        for key in &self.key_order {
            execute_pending(key, &mut vars, &mut done)?;
            let current = vars.get(key).cloned().unwrap_or_default();
            let expanded = expand(&current, &mut vars, &mut done, parent)?;
            vars.insert(key.clone(), expanded);
        }

        if let Some(parent) = parent {
            for key in &parent.key_order {
                let empty = vars.get(key).map(|v| v.is_empty()).unwrap_or(true);
                if empty && let Some(v) = parent.get(key) {
                    vars.insert(key.clone(), v.to_string());
                }
            }
        }

        debug!(
            file = %self.raw.filepath,
            declared = self.key_order.len(),
            seeded = seeded.len(),
            "envs resolved"
        );
        Ok(ResolvedEnv { vars, key_order })
    }

    /// Write `KEY=value` lines, keys right-aligned to the widest key.
    pub fn list(&self, out: &OutputSink) -> Result<()> {
        let resolved = self.resolve()?;
        let width = resolved
            .key_order
            .iter()
            .map(|k| k.len())
            .max()
            .unwrap_or(0);
        for key in &resolved.key_order {
            let value = resolved.get(key).unwrap_or_default();
            let line = format!("{}{}\n", green(&format!("{}=", pad_left(key, width))), value);
            out.write_str(&line)?;
        }
        Ok(())
    }

    /// Write the unprocessed `envs` YAML.
    pub fn print_raw(&self, out: &OutputSink) -> Result<()> {
        out.write_str(&self.raw.envs)?;
        out.write_str("\n")?;
        Ok(())
    }
}

/// Parse `- KEY: value` entries into values and first-seen key order.
fn parse_declarations(text: &str) -> Result<(EnvMap, Vec<String>)> {
    let mut declared = EnvMap::new();
    let mut key_order = Vec::new();
    if text.trim().is_empty() {
        return Ok((declared, key_order));
    }
    let entries: Option<Vec<serde_yaml::Mapping>> =
        serde_yaml::from_str(text).map_err(|e| RonError::EnvYaml(e.to_string()))?;
    for entry in entries.unwrap_or_default() {
        for (k, v) in entry {
            let key = scalar_to_string(&k)?;
            let value = scalar_to_string(&v)?;
            if !declared.contains_key(&key) {
                key_order.push(key.clone());
            }
            declared.insert(key, value);
        }
    }
    Ok((declared, key_order))
}

fn scalar_to_string(value: &serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value;
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        other => Err(RonError::EnvYaml(format!(
            "expected a scalar value, got {:?}",
            other
        ))),
    }
}

/// Run `key`'s `+` command if it has not been run yet.
fn execute_pending(key: &str, vars: &mut EnvMap, done: &mut HashSet<String>) -> Result<()> {
    if done.contains(key) {
        return Ok(());
    }
    done.insert(key.to_string());
    let Some(script) = vars
        .get(key)
        .and_then(|v| v.strip_prefix(EXEC_SENTINEL))
        .map(str::to_string)
    else {
        return Ok(());
    };
    let out = run_sentinel(key, &script, vars)?;
    vars.insert(key.to_string(), out);
    Ok(())
}

fn run_sentinel(key: &str, script: &str, vars: &EnvMap) -> Result<String> {
    debug!(key, "executing env command");
    let out = capture_shell(script, Some(vars)).map_err(|e| RonError::EnvCommand {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    if !out.success() {
        return Err(RonError::EnvCommand {
            key: key.to_string(),
            message: format!(
                "status code: {} stdout: {} stderr: {}",
                out.status,
                out.stdout.trim(),
                out.stderr.trim()
            ),
        });
    }
    Ok(out.stdout.trim().to_string())
}

/// Expand `$VAR` and `${VAR}` against the in-progress map. Referenced keys
/// with a pending `+` command are executed first; unknown keys fall back to
/// the root env and then to the empty string.
fn expand(
    input: &str,
    vars: &mut EnvMap,
    done: &mut HashSet<String>,
    parent: Option<&ResolvedEnv>,
) -> Result<String> {
    if !input.contains('$') {
        return Ok(input.to_string());
    }
    let mut failure: Option<RonError> = None;
    let expanded = shellexpand::env_with_context_no_errors(input, |name: &str| {
        if failure.is_some() {
            return Some(String::new());
        }
        if vars.contains_key(name) {
            if let Err(e) = execute_pending(name, vars, done) {
                failure = Some(e);
                return Some(String::new());
            }
            return vars.get(name).cloned();
        }
        Some(
            parent
                .and_then(|p| p.get(name))
                .unwrap_or_default()
                .to_string(),
        )
    })
    .into_owned();
    match failure {
        Some(e) => Err(e),
        None => Ok(expanded),
    }
}
