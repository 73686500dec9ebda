//! # Workflow Harness
//!
//! A test harness for GitHub Actions-style workflows. A test plans a
//! workflow, overrides what it needs to isolate (job and step results,
//! outputs, environment, container contents), executes it and asserts on
//! the recorded outcome.
//!
//! ## Features
//!
//! - **Override plan** - Force results, outputs and environment before execution
//! - **Result index** - Look up jobs, steps and matrix cells by id or display name
//! - **Log aggregation** - One transcript per job, prefixed with step and child names
//! - **Pluggable engine** - Any [`Engine`]; a host-process [`LocalEngine`] is bundled
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use workflow_harness::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), HarnessError> {
//!     let config = HarnessConfig::builder()
//!         .workflow_path(".github/workflows/ci.yml")
//!         .build()?;
//!
//!     let mut run = Harness::local(config).plan().await?;
//!     run.job("main")?.set_output("greeting", "Goodbye!");
//!
//!     let results = run.execute().await?;
//!     let step = results.job("cleanup")?.step("Clean up")?;
//!     assert_eq!(step.logs(), "The output from the main job was Goodbye!");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod github_env;
pub mod harness;
pub mod identity;
pub mod plan;
pub mod results;
pub mod telemetry;
pub mod workflow;

pub use config::{HarnessConfig, HarnessConfigBuilder};
pub use engine::{
    Engine, Execution, Interpolate, LocalEngine, PlannedGraph, RunRecord, RunResult, Selection,
    StepRecord,
};
pub use error::{AssertionMismatch, EntityKind, HarnessError, InputMismatch};
pub use github_env::GithubEnv;
pub use harness::{Harness, PlannedRun};
pub use plan::{JobOverrides, OverridePlan, StepOverrides};
pub use results::{JobView, Results, StepView};

/// Everything a workflow test usually needs
pub mod prelude {
    pub use crate::config::HarnessConfig;
    pub use crate::engine::RunResult;
    pub use crate::error::HarnessError;
    pub use crate::github_env::GithubEnv;
    pub use crate::harness::Harness;
    pub use crate::results::{JobView, Results, StepView};
}
