//! Workflow types and definitions
//!
//! This module contains all types for defining and parsing workflows:
//! - `job` - Workflow, Job, Step, and Triggers
//! - `context` - ExecutionContext for runtime state
//! - `expressions` - Expression evaluation for `${{ }}` syntax
//! - `loader` - Load workflows from files and directories

pub mod context;
pub mod expressions;
pub mod job;
pub mod loader;

// Re-export all public types for convenience
pub use context::{ExecutionContext, NeedContext};
pub use expressions::{
    evaluate as evaluate_expression, evaluate_condition, interpolate, ConditionScope,
    ExpressionError,
};
pub use job::{
    yaml_to_string, Container, InputSpec, Job, JobKind, Step, StepKind, Strategy, Triggers,
    Workflow,
};
pub use loader::{LoadError, WorkflowLoader};
