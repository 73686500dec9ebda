#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use workflow_harness::{Harness, HarnessConfig, HarnessConfigBuilder};

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_workflow(dir: &Path, filename: &str, content: &str) -> PathBuf {
    let path = dir.join(filename);
    fs::write(&path, content).expect("Failed to write workflow file");
    path
}

/// Config rooted at `dir` for the workflow in `filename`
pub fn config_for(dir: &Path, filename: &str) -> HarnessConfigBuilder {
    HarnessConfig::builder()
        .workflow_path(dir.join(filename))
        .workdir(dir)
}

pub fn harness_for(dir: &Path, filename: &str) -> Harness {
    let config = config_for(dir, filename)
        .build()
        .expect("Failed to build config");
    Harness::local(config)
}

/// A main job publishing a greeting and a cleanup job that always runs and fails
pub fn outputs_workflow() -> &'static str {
    r#"
name: outputs
on: push
jobs:
  main:
    outputs:
      greeting: ${{ steps.greet.outputs.greeting }}
    steps:
      - name: Run a one-line script
        run: echo Hello, world!
      - id: greet
        run: echo "greeting=Hello" >> "$GITHUB_OUTPUT"
  cleanup:
    needs: main
    if: always()
    steps:
      - name: Clean up
        run: |
          echo "The output from the main job was ${{ needs.main.outputs.greeting }}"
          exit 1
"#
}

pub fn caller_workflow() -> &'static str {
    r#"
name: caller
on: push
jobs:
  call:
    uses: ./called.yml
    with:
      target: production
      region: ${{ vars.REGION }}
"#
}

pub fn called_workflow() -> &'static str {
    r#"
name: called
on:
  workflow_call:
    inputs:
      target:
        type: string
      region:
        type: string
        default: us
jobs:
  job_2:
    needs: job_1
    steps:
      - name: Report
        run: echo "deployed to ${{ inputs.target }}"
  job_1:
    steps:
      - name: Greet
        run: |
          echo "hello from job_1"

          echo "region ${{ inputs.region }}"
"#
}

pub fn matrix_workflow() -> &'static str {
    r#"
name: matrix
on: push
jobs:
  test:
    name: Unit tests
    strategy:
      matrix:
        node: ["18", "20"]
    steps:
      - name: Test on ${{ matrix.node }}
        run: echo "node ${{ matrix.node }}"
      - name: Setup node
        uses: actions/setup-node@v4
        with:
          node-version: ${{ matrix.node }}
          cache: npm
          cache.dependency path: package-lock.json
"#
}
