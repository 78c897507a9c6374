//! Integration tests for running targets across a loaded cascade.

use ron_runner::config::{ConfigLoader, ConfigPaths};
use ron_runner::env::EnvMap;
use ron_runner::error::RonError;
use ron_runner::make::{Make, RunOptions};
use ron_runner::registry::Configs;
use ron_runner::sink::OutputSink;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn os_envs() -> EnvMap {
    let mut envs = EnvMap::new();
    envs.insert("PATH".into(), std::env::var("PATH").unwrap_or_default());
    envs.insert("FROM_OS".into(), "os".into());
    envs
}

async fn make_in(temp: &TempDir) -> Make {
    let loaded = ConfigLoader::new(ConfigPaths::in_dir(temp.path()))
        .load()
        .await
        .unwrap();
    let configs = Configs::from_parts(loaded.configs, None, os_envs())
        .unwrap()
        .with_output(OutputSink::memory(), OutputSink::memory());
    Make::new(Arc::new(configs))
}

fn stdout(make: &Make) -> String {
    make.configs().stdout().contents()
}

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("ron.yaml"),
        r#"
envs:
  - APP: root
  - SHARED: from-root
targets:
  build:
    before: [proj:lint]
    after: [announce]
    cmd: echo "build $APP"
  announce:
    cmd: echo "announce $SHARED"
"#,
    )
    .unwrap();
    fs::create_dir_all(temp.path().join(".ron")).unwrap();
    fs::write(
        temp.path().join(".ron/proj.yaml"),
        r#"
envs:
  - SHARED: from-proj
  - TAG: +echo "$APP-$FROM_OS"
targets:
  lint:
    cmd: echo "lint $SHARED $TAG"
  build:
    cmd: echo "proj build"
  fail:
    cmd: |
      echo "failing"
      exit 7
"#,
    )
    .unwrap();
    temp
}

#[tokio::test]
async fn test_cross_file_dependencies_use_owning_env() {
    let temp = project();
    let make = make_in(&temp).await;
    make.run(&["build"]).await.unwrap();
    assert_eq!(
        stdout(&make),
        "lint from-proj root-os\nbuild root\nannounce from-root\n"
    );
}

#[tokio::test]
async fn test_prefixed_name_selects_lower_priority_file() {
    let temp = project();
    let make = make_in(&temp).await;
    make.run(&["proj:build"]).await.unwrap();
    assert_eq!(stdout(&make), "proj build\n");
}

#[tokio::test]
async fn test_failure_status_propagates() {
    let temp = project();
    let make = make_in(&temp).await;
    let err = make.run(&["proj:lint", "fail", "build"]).await.unwrap_err();
    assert!(matches!(err, RonError::Execution { ref target, status: 7 } if target == "fail"));
    assert_eq!(err.exit_status(), 7);
    assert_eq!(stdout(&make), "lint from-proj root-os\nfailing\n");
}

#[tokio::test]
async fn test_builtin_default_target_runs() {
    let temp = project();
    let make = make_in(&temp).await;
    make.run(&["default:prep"]).await.unwrap();
    // The default file declares its own APP, which wins over the root's.
    let cwd = std::env::current_dir().unwrap();
    let name = cwd.file_name().unwrap().to_string_lossy().into_owned();
    let out = stdout(&make);
    assert!(out.starts_with(&format!("{} (", name)), "unexpected output: {out}");
    assert!(out.ends_with(")\n"));
}

#[tokio::test]
async fn test_debug_echo_precedes_output() {
    let temp = project();
    let make = make_in(&temp).await.with_options(RunOptions {
        debug: true,
        ..RunOptions::default()
    });
    make.run(&["announce"]).await.unwrap();
    let out = stdout(&make);
    assert!(out.contains("echo \"announce from-root\""));
    assert!(out.ends_with("announce from-root\n"));
}
