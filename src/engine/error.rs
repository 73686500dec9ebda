//! Local engine error types

use crate::engine::planner::PlanError;
use crate::workflow::{ExpressionError, LoadError};

/// Errors that can occur while the local engine plans or runs a job
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote reusable workflows are not supported: {0}")]
    RemoteWorkflow(String),

    #[error("Reusable workflow nesting exceeds {0} levels")]
    NestingTooDeep(usize),

    #[error("Step must define exactly one of 'run' or 'uses'")]
    InvalidStep,

    #[error("Job(s) failed: {}", .0.join(", "))]
    JobsFailed(Vec<String>),
}
