//! Configuration discovery and loading.
//!
//! Sources are collected most specific first:
//! 1. **Override** - `--yaml`/`RON_YAML`, else the nearest `ron.yaml` in the
//!    working directory or an ancestor
//! 2. **Fragments** - `*.yaml` in the nearest `.ron/` directory, then in
//!    `~/.ron/`
//! 3. **Default** - `--default`/`RON_DEFAULT_YAML`, else the compiled-in
//!    document
//!
//! Every source is fetched, template-rendered and split into its raw
//! `envs`, `remotes` and `targets` sections.

use super::fetch::{fetch, is_url};
use super::template;
use super::types::{ConfigFile, RawConfig};
use crate::error::{Result, RonError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Root override file searched for in the working directory and ancestors.
pub const CONFIG_FILE_NAME: &str = "ron.yaml";
/// Directory holding config fragments.
pub const CONFIG_DIR_NAME: &str = ".ron";
/// Provenance reported for the compiled-in default document.
pub const BUILTIN_DEFAULT_PATH: &str = "builtin:config/default.yaml";

const BUILTIN_DEFAULT: &str = include_str!("default.yaml");

/// Marker appended to the failing line of a YAML error context.
const ERROR_MARKER: &str = " <<<<<<<<<<";
/// Lines shown before and after the failing line.
const ERROR_CONTEXT_LINES: usize = 5;

/// Where the loader looks for sources.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Directory discovery starts from.
    pub working_dir: PathBuf,
    /// Explicit override source, local path or URL.
    pub override_path: Option<String>,
    /// Explicit default source, local path or URL.
    pub default_path: Option<String>,
    /// Directory whose `.ron/` is always appended.
    pub home_dir: Option<PathBuf>,
    /// Include the home `.ron/` directory.
    pub with_home: bool,
}

impl ConfigPaths {
    /// Paths from the process working directory and environment.
    ///
    /// - `RON_YAML` - override source
    /// - `RON_DEFAULT_YAML` - default source
    /// - `RON_HOME` - used instead of the user's home directory
    pub fn discover() -> Result<Self> {
        let working_dir = std::env::current_dir()?;
        let home_dir = std::env::var("RON_HOME")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::home_dir);
        Ok(Self {
            working_dir,
            override_path: non_empty_var("RON_YAML"),
            default_path: non_empty_var("RON_DEFAULT_YAML"),
            home_dir,
            with_home: true,
        })
    }

    /// Paths rooted at `dir`, ignoring the environment and the home
    /// directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: dir.into(),
            override_path: None,
            default_path: None,
            home_dir: None,
            with_home: false,
        }
    }

    pub fn with_override(mut self, path: Option<String>) -> Self {
        if path.is_some() {
            self.override_path = path;
        }
        self
    }

    pub fn with_default(mut self, path: Option<String>) -> Self {
        if path.is_some() {
            self.default_path = path;
        }
        self
    }

    pub fn with_home_dir(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home.into());
        self.with_home = true;
        self
    }

    pub fn without_home(mut self) -> Self {
        self.with_home = false;
        self
    }

    /// Absolute form of a local source; URLs are returned unchanged.
    fn resolve_source(&self, path: &str) -> String {
        if is_url(path) {
            return path.to_string();
        }
        let p = Path::new(path);
        if p.is_absolute() {
            path.to_string()
        } else {
            self.working_dir.join(p).to_string_lossy().into_owned()
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

/// Result of a load.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfigs {
    /// Sources in priority order, default last.
    pub configs: Vec<RawConfig>,
    /// Directory of the discovered `ron.yaml`, when it was found by walking
    /// up rather than given explicitly.
    pub found_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn new(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    /// Load every source. The first failing source aborts the load.
    pub async fn load(&self) -> Result<LoadedConfigs> {
        let mut loaded = LoadedConfigs::default();

        // Tier 1: override
        let override_path = match &self.paths.override_path {
            Some(path) => Some(self.paths.resolve_source(path)),
            None => find_config_file(&self.paths.working_dir).map(|found| {
                loaded.found_dir = found.parent().map(Path::to_path_buf);
                found.to_string_lossy().into_owned()
            }),
        };
        if let Some(dir) = &loaded.found_dir {
            info!(dir = %dir.display(), "found {}", CONFIG_FILE_NAME);
        }
        if let Some(path) = override_path {
            loaded.configs.push(load_config_file(&path).await?);
        }

        // Tier 2: .ron fragments
        let home = if self.paths.with_home {
            self.paths.home_dir.as_deref()
        } else {
            None
        };
        let dirs = find_config_dirs(&self.paths.working_dir, home);
        for file in find_config_dir_files(&dirs) {
            let path = file.to_string_lossy().into_owned();
            loaded.configs.push(load_config_file(&path).await?);
        }

        // Tier 3: default
        let default = match &self.paths.default_path {
            Some(path) => load_config_file(&self.paths.resolve_source(path)).await?,
            None => parse_config(BUILTIN_DEFAULT_PATH, BUILTIN_DEFAULT)?,
        };
        loaded.configs.push(default);

        debug!(sources = loaded.configs.len(), "configuration loaded");
        Ok(loaded)
    }
}

/// Fetch and parse one source.
pub async fn load_config_file(path: &str) -> Result<RawConfig> {
    debug!(path, "loading config file");
    let content = fetch(path).await?;
    parse_config(path, &content)
}

/// Render and parse one document into its raw sections.
pub fn parse_config(path: &str, content: &str) -> Result<RawConfig> {
    let content = template::render(path, content)?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| extract_config_error(path, &content, &e))?;
    if value.is_null() {
        return Err(RonError::EmptyDocument(path.to_string()));
    }
    let file: ConfigFile =
        serde_yaml::from_str(&content).map_err(|e| extract_config_error(path, &content, &e))?;
    RawConfig::from_config_file(path, file)
}

/// Annotate a YAML error with the lines around its location.
pub fn extract_config_error(path: &str, input: &str, err: &serde_yaml::Error) -> RonError {
    let context = err
        .location()
        .map(|loc| error_context(input, loc.line()))
        .unwrap_or_default();
    RonError::Yaml {
        path: path.to_string(),
        message: err.to_string(),
        context,
    }
}

/// Lines `line - 5 ..= line + 5` of `input` (1-based), with `line` marked.
pub fn error_context(input: &str, line: usize) -> String {
    let first = line.saturating_sub(ERROR_CONTEXT_LINES).max(1);
    let last = line + ERROR_CONTEXT_LINES;
    input
        .lines()
        .enumerate()
        .map(|(i, text)| (i + 1, text))
        .filter(|(n, _)| *n >= first && *n <= last)
        .map(|(n, text)| {
            if n == line {
                format!("{}{}", text, ERROR_MARKER)
            } else {
                text.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Nearest `ron.yaml` in `start` or an ancestor.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// The nearest `.ron` directory at or above `start`, followed by the home
/// `.ron` directory when given and not already found.
pub fn find_config_dirs(start: &Path, home: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = start
        .ancestors()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .find(|candidate| candidate.is_dir())
        .into_iter()
        .collect();
    if let Some(home) = home {
        let home_dir = home.join(CONFIG_DIR_NAME);
        if home_dir.is_dir() && !dirs.iter().any(|d| same_dir(d, &home_dir)) {
            dirs.push(home_dir);
        }
    }
    dirs
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// `*.yaml` files of each directory, sorted within each directory.
pub fn find_config_dir_files(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for dir in dirs {
        let pattern = format!(
            "{}/*.yaml",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let Ok(paths) = glob::glob(&pattern) else {
            continue;
        };
        let mut found: Vec<PathBuf> = paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).collect();
        found.sort();
        for path in &found {
            debug!(path = %path.display(), "found config fragment");
        }
        files.extend(found);
    }
    files
}
