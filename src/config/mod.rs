//! Cascading configuration.
//!
//! Sources, most specific first:
//! 1. **Override** - `ron.yaml` in the working directory or an ancestor
//! 2. **Fragments** - `.ron/*.yaml` nearest the working directory, then `~/.ron/*.yaml`
//! 3. **Default** - compiled in from `./config/default.yaml`
//!
//! Sources are not merged. Each becomes one [`RawConfig`] and keeps its
//! own targets and envs; priority decides lookup order.
//!
//! ## Environment Variables
//! - `RON_YAML` - Override source (path or URL)
//! - `RON_DEFAULT_YAML` - Default source (path or URL)
//! - `RON_HOME` - Directory searched for `.ron/` instead of the home directory

mod fetch;
mod loader;
mod template;
mod types;

pub use fetch::{fetch, is_url};
pub use loader::{
    BUILTIN_DEFAULT_PATH, CONFIG_DIR_NAME, CONFIG_FILE_NAME, ConfigLoader, ConfigPaths,
    LoadedConfigs, error_context, extract_config_error, find_config_dir_files, find_config_dirs,
    find_config_file, load_config_file, parse_config,
};
pub use template::{is_template, render as render_template};
pub use types::*;
