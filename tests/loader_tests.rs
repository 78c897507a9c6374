//! Integration tests for configuration discovery and loading.
//!
//! Tests the ConfigLoader cascade:
//! - ron.yaml discovery by walking up, and explicit overrides
//! - .ron fragments in the project and home directories
//! - default sources, YAML error reporting and HTTP sources

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use ron_runner::config::{BUILTIN_DEFAULT_PATH, ConfigLoader, ConfigPaths, LoadedConfigs};
use ron_runner::error::RonError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ROOT_YAML: &str = r#"
envs:
  - APP: root
targets:
  build:
    description: build it
    cmd: echo build
"#;

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

async fn load(paths: ConfigPaths) -> LoadedConfigs {
    ConfigLoader::new(paths).load().await.expect("load failed")
}

/// Layout: root/ron.yaml, root/.ron/{b,a}.yaml, home/.ron/home.yaml, and a
/// nested working directory root/sub/dir.
fn project() -> (TempDir, PathBuf, PathBuf) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("project");
    let home = temp.path().join("home");
    write(&root.join("ron.yaml"), ROOT_YAML);
    write(&root.join(".ron/b.yaml"), "targets:\n  b:\n    cmd: echo b\n");
    write(&root.join(".ron/a.yaml"), "targets:\n  a:\n    cmd: echo a\n");
    write(&root.join(".ron/notes.txt"), "not yaml");
    write(&home.join(".ron/home.yaml"), "remotes:\n  staging:\n    - host: h1\n");
    let working = root.join("sub/dir");
    fs::create_dir_all(&working).unwrap();
    (temp, root, working)
}

#[tokio::test]
async fn test_cascade_order_and_found_dir() {
    let (temp, root, working) = project();
    let loaded = load(ConfigPaths::in_dir(&working).with_home_dir(temp.path().join("home"))).await;

    let paths: Vec<&str> = loaded.configs.iter().map(|c| c.filepath.as_str()).collect();
    assert_eq!(paths.len(), 5);
    assert_eq!(paths[0], root.join("ron.yaml").to_string_lossy());
    assert_eq!(paths[1], root.join(".ron/a.yaml").to_string_lossy());
    assert_eq!(paths[2], root.join(".ron/b.yaml").to_string_lossy());
    assert_eq!(paths[3], temp.path().join("home/.ron/home.yaml").to_string_lossy());
    assert_eq!(paths[4], BUILTIN_DEFAULT_PATH);
    assert_eq!(loaded.found_dir.as_deref(), Some(root.as_path()));

    assert!(loaded.configs[0].envs.contains("APP: root"));
    assert!(loaded.configs[3].remotes.contains("h1"));
}

#[tokio::test]
async fn test_without_home() {
    let (temp, _root, working) = project();
    let paths = ConfigPaths::in_dir(&working)
        .with_home_dir(temp.path().join("home"))
        .without_home();
    let loaded = load(paths).await;
    assert_eq!(loaded.configs.len(), 4);
    assert!(!loaded.configs.iter().any(|c| c.filepath.contains("home.yaml")));
}

#[tokio::test]
async fn test_explicit_override_and_default() {
    let (_temp, root, working) = project();
    let other = root.join("other.yaml");
    let default = root.join("defaults/base.yaml");
    write(&other, "targets:\n  o:\n    cmd: echo o\n");
    write(&default, "targets:\n  d:\n    cmd: echo d\n");

    let paths = ConfigPaths::in_dir(&working)
        .with_override(Some(other.to_string_lossy().into_owned()))
        .with_default(Some(default.to_string_lossy().into_owned()));
    let loaded = load(paths).await;

    assert!(loaded.found_dir.is_none());
    assert_eq!(loaded.configs[0].filepath, other.to_string_lossy());
    assert_eq!(
        loaded.configs.last().unwrap().filepath,
        default.to_string_lossy()
    );
    assert!(!loaded.configs.iter().any(|c| c.filepath.ends_with("ron.yaml")));
}

#[tokio::test]
async fn test_relative_override_resolved_against_working_dir() {
    let (_temp, _root, working) = project();
    write(&working.join("local.yaml"), "targets:\n  l:\n    cmd: echo l\n");
    let paths = ConfigPaths::in_dir(&working).with_override(Some("local.yaml".to_string()));
    let loaded = load(paths).await;
    assert_eq!(loaded.configs[0].filepath, working.join("local.yaml").to_string_lossy());
}

#[tokio::test]
async fn test_no_sources_yields_builtin_default() {
    let temp = TempDir::new().unwrap();
    let loaded = load(ConfigPaths::in_dir(temp.path())).await;
    // A ron.yaml above the temp dir would be picked up too.
    let last = loaded.configs.last().unwrap();
    assert_eq!(last.filepath, BUILTIN_DEFAULT_PATH);
    assert!(last.targets.contains("prep"));
}

#[tokio::test]
async fn test_broken_fragment_aborts_with_context() {
    let (_temp, root, working) = project();
    let bad = root.join(".ron/c.yaml");
    write(
        &bad,
        "targets:\n  c:\n    cmd: echo c\n    description: 2\n     oops: 3\n  d:\n    cmd: echo d\n",
    );
    let err = ConfigLoader::new(ConfigPaths::in_dir(&working))
        .load()
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, RonError::Yaml { .. }));
    assert!(msg.starts_with(&*bad.to_string_lossy()));
    assert!(msg.contains("<<<<<<<<<<"));
    assert!(msg.contains("oops: 3"));
}

#[tokio::test]
async fn test_empty_override_is_error() {
    let (_temp, root, working) = project();
    write(&root.join("ron.yaml"), "\n# nothing\n");
    let err = ConfigLoader::new(ConfigPaths::in_dir(&working))
        .load()
        .await
        .unwrap_err();
    assert!(matches!(err, RonError::EmptyDocument(_)));
}

#[tokio::test]
async fn test_template_rendered_before_parse() {
    let (_temp, root, working) = project();
    write(
        &root.join("ron.yaml"),
        "targets:\n{% for name in 'one,two' | split(',') %}  {{ name }}:\n    cmd: echo {{ name | upper }}\n{% endfor %}",
    );
    let loaded = load(ConfigPaths::in_dir(&working)).await;
    let targets = &loaded.configs[0].targets;
    assert!(targets.contains("one:"));
    assert!(targets.contains("echo TWO"));
}

async fn serve() -> String {
    let app = Router::new()
        .route(
            "/ron.yaml",
            get(|| async { "targets:\n  remote_build:\n    cmd: echo remote\n" }),
        )
        .route(
            "/missing.yaml",
            get(|| async { (StatusCode::NOT_FOUND, "no such file") }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_http_sources() {
    let base = serve().await;
    let temp = TempDir::new().unwrap();

    let url = format!("{}/ron.yaml", base);
    let loaded = load(ConfigPaths::in_dir(temp.path()).with_override(Some(url.clone()))).await;
    assert_eq!(loaded.configs[0].filepath, url);
    assert!(loaded.configs[0].targets.contains("remote_build"));

    let missing = format!("{}/missing.yaml", base);
    let err = ConfigLoader::new(ConfigPaths::in_dir(temp.path()).with_default(Some(missing)))
        .load()
        .await
        .unwrap_err();
    match err {
        RonError::HttpStatus { status, body, .. } => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such file");
        }
        other => panic!("expected http status error, got {other}"),
    }
}
