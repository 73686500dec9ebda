mod common;

use common::*;
use std::fs;
use workflow_harness::prelude::*;

const ENV_WORKFLOW: &str = r#"
name: env
on: push
env:
  STAGE: ci
jobs:
  build:
    runs-on: ubuntu-latest
    env:
      TARGET: debug
    steps:
      - name: Show ref
        run: echo "$GITHUB_REF"
      - name: Show env
        run: echo "$STAGE $TARGET"
      - name: Read config
        run: cat "$HARNESS_CONTAINER_ROOT/etc/app.conf"
      - name: Leak
        run: |
          echo "token ${{ secrets.API_TOKEN }}"
          echo "::add-mask::runtime-secret"
          echo "value runtime-secret"
"#;

#[tokio::test]
async fn test_environment_container_and_masks() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "env.yml", ENV_WORKFLOW);
    let host_file = dir.path().join("app.conf");
    fs::write(&host_file, "mode=test\n").unwrap();

    let config = config_for(dir.path(), "env.yml")
        .github_env(GithubEnv::Ref, "refs/tags/v1.0.0")
        .secrets([("API_TOKEN", "s3cr3t")])
        .build()
        .unwrap();
    let mut run = Harness::local(config).plan().await.unwrap();
    run.job("build")
        .unwrap()
        .set_env([("TARGET", "release")])
        .set_container_image("alpine:3.20")
        .copy_file(host_file.clone(), "/etc/app.conf")
        .add_bind_mount(dir.path(), "/workspace");
    let results = run.execute().await.unwrap();

    let build = results.job("build").unwrap();
    assert!(build.succeeded());
    assert_eq!(build.step("Show ref").unwrap().logs(), "refs/tags/v1.0.0");
    assert_eq!(build.step("Show env").unwrap().logs(), "ci release");
    assert_eq!(build.step("Read config").unwrap().logs(), "mode=test");
    assert_eq!(
        build.step("Leak").unwrap().logs(),
        "token ***\nvalue ***"
    );
    assert!(build.masks().contains(&"s3cr3t".to_string()));
    assert!(build.masks().contains(&"runtime-secret".to_string()));

    let record = build.record();
    assert_eq!(record.container_image.as_deref(), Some("alpine:3.20"));
    assert_eq!(record.binds.len(), 1);
    assert_eq!(record.binds[0].destination, "/workspace");
}

#[tokio::test]
async fn test_step_env_override() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "env.yml", ENV_WORKFLOW);

    let mut run = harness_for(dir.path(), "env.yml").plan().await.unwrap();
    run.job("build")
        .unwrap()
        .step("Show env")
        .unwrap()
        .set_env([("STAGE", "nightly")]);
    run.job("build")
        .unwrap()
        .step("Read config")
        .unwrap()
        .skip();
    let results = run.execute().await.unwrap();

    let build = results.job("build").unwrap();
    assert_eq!(build.step("Show env").unwrap().logs(), "nightly debug");
    assert_eq!(build.record().container_image.as_deref(), Some("node:16-buster-slim"));
}

#[tokio::test]
async fn test_missing_host_file_aborts_before_execution() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "env.yml", ENV_WORKFLOW);

    let mut run = harness_for(dir.path(), "env.yml").plan().await.unwrap();
    run.job("build")
        .unwrap()
        .copy_file(dir.path().join("missing.conf"), "/etc/app.conf");
    let err = run.execute().await.unwrap_err();
    assert!(matches!(err, HarnessError::InjectedFile { .. }));
}
