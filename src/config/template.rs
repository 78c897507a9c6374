//! Template pre-processing of config documents.
//!
//! Documents containing `{{` or `{%` are rendered with minijinja before they
//! are parsed as YAML. The context exposes the OS environment as `env`.

use crate::env::os_envs;
use crate::error::{Result, RonError};
use crate::execute::capture_shell;
use minijinja::value::Value;
use minijinja::{Environment, ErrorKind, context};
use tracing::warn;

/// Whether `source` contains template syntax.
pub fn is_template(source: &str) -> bool {
    source.contains("{{") || source.contains("{%")
}

/// Render `source`, or return it unchanged when it has no template syntax.
pub fn render(name: &str, source: &str) -> Result<String> {
    if !is_template(source) {
        return Ok(source.to_string());
    }
    let env = environment();
    env.render_str(source, context! { env => os_envs() })
        .map_err(|e| RonError::Template {
            path: name.to_string(),
            message: e.to_string(),
        })
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.add_function("bash", bash);
    env.add_function("get", |item: Option<Value>, default: Value| -> Value {
        match item {
            Some(v) if !v.is_undefined() && !v.is_none() => v,
            _ => default,
        }
    });
    env.add_filter("underscore", |s: String| -> String { s.replace('-', "_") });
    env.add_filter("split", |s: String, sep: String| -> Vec<String> {
        s.split(sep.as_str()).map(str::to_string).collect()
    });
    env
}

/// Trimmed stdout of a shell command.
fn bash(cmd: String) -> std::result::Result<String, minijinja::Error> {
    let out = capture_shell(&cmd, None)
        .map_err(|e| minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    if !out.success() {
        warn!(status = out.status, "template command failed: {}", out.stderr.trim());
    }
    Ok(out.stdout.trim().to_string())
}
