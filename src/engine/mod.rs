//! Workflow engine boundary
//!
//! This module contains:
//! - `Engine` / `Interpolate` - the calls the harness makes into an engine
//! - `graph` - the planned job graph the override plan mutates
//! - `result` - run records produced by execution
//! - `planner` - job selection, staging and matrix expansion
//! - `executor` - the bundled host-process engine
//! - `shell` - script steps and GitHub file commands
//! - `error` - local engine error types

pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod result;
pub mod shell;

use async_trait::async_trait;
use std::path::Path;

use crate::config::HarnessConfig;
use crate::workflow::ExecutionContext;

pub use error::EngineError;
pub use executor::LocalEngine;
pub use graph::{
    BindMount, JobPredicate, JobRun, PlannedGraph, PlannedStep, Stage, StepOutputTable,
    StepPredicate, StepResultRule,
};
pub use planner::PlanError;
pub use result::{RunRecord, RunResult, StepRecord};

/// Which jobs a plan covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// One job, plus the jobs it needs
    Job(String),
    /// Every job of the workflows triggered by an event
    Event(String),
    All,
}

/// Evaluates dynamic text against a job's runtime context
pub trait Interpolate: Send + Sync {
    fn interpolate(&self, text: &str, context: &ExecutionContext) -> String;
}

/// Outcome of an execution call
///
/// Records are kept when the engine reports an error, so that failed runs
/// can still be inspected.
#[derive(Debug, Default)]
pub struct Execution {
    pub records: Vec<RunRecord>,
    pub error: Option<anyhow::Error>,
}

/// An engine that plans and executes workflows
#[async_trait]
pub trait Engine: Interpolate {
    /// Turn a workflow file or directory into ordered stages of job runs
    async fn plan(&self, workflow_path: &Path, selection: &Selection)
        -> anyhow::Result<PlannedGraph>;

    /// Execute a (possibly mutated) plan
    async fn execute(&self, graph: PlannedGraph, config: &HarnessConfig) -> Execution;
}
