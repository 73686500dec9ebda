//! Execution context for workflow runtime
//!
//! This module contains the runtime context used during workflow execution
//! for expression evaluation: environment variables, secrets, matrix values,
//! inputs, step outputs and the state of the jobs a job depends on.

use std::collections::{BTreeMap, HashMap};

use crate::engine::RunResult;

/// Outputs and result of a job as seen by its dependents (`needs.<id>`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeedContext {
    pub result: Option<RunResult>,
    pub outputs: HashMap<String, String>,
}

/// Runtime context for expression evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    /// Environment variables
    pub env: HashMap<String, String>,

    /// Secrets (masked in logs)
    pub secrets: HashMap<String, String>,

    /// Configuration variables (`vars.*`)
    pub vars: HashMap<String, String>,

    /// Workflow inputs (`inputs.*`)
    pub inputs: HashMap<String, String>,

    /// Matrix cell values (`matrix.*`)
    pub matrix: BTreeMap<String, String>,

    /// Step outputs (step_id -> output_name -> value)
    pub steps: HashMap<String, HashMap<String, String>>,

    /// Step outcomes (step_id -> result)
    pub step_outcomes: HashMap<String, RunResult>,

    /// Jobs the current job depends on
    pub needs: HashMap<String, NeedContext>,

    /// Outputs of jobs of a called workflow (`jobs.*`)
    pub jobs: HashMap<String, HashMap<String, String>>,

    /// Current job id
    pub current_job: Option<String>,

    /// Triggering event name
    pub event_name: String,

    /// Run ID
    pub run_id: String,

    /// Whether a step of the current job has failed so far
    pub job_failed: bool,
}

impl ExecutionContext {
    /// Create a new execution context with a generated run ID
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        }
    }

    /// Set a step output
    pub fn set_output(&mut self, step_id: &str, key: &str, value: String) {
        self.steps
            .entry(step_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Get a step output
    pub fn get_output(&self, step_id: &str, key: &str) -> Option<&String> {
        self.steps.get(step_id)?.get(key)
    }

    /// Set an environment variable
    pub fn set_env(&mut self, key: &str, value: String) {
        self.env.insert(key.to_string(), value);
    }

    /// Get an environment variable
    pub fn get_env(&self, key: &str) -> Option<&String> {
        self.env.get(key)
    }

    /// Set a job output of a called workflow's job
    pub fn set_job_output(&mut self, job_id: &str, key: &str, value: String) {
        self.jobs
            .entry(job_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Get a job output of a called workflow's job
    pub fn get_job_output(&self, job_id: &str, key: &str) -> Option<&String> {
        self.jobs.get(job_id)?.get(key)
    }

    /// Merge environment variables from another source
    pub fn merge_env(&mut self, env: &HashMap<String, String>) {
        for (key, value) in env {
            self.env.insert(key.clone(), value.clone());
        }
    }

    /// Whether every job this job depends on succeeded
    pub fn needs_succeeded(&self) -> bool {
        self.needs
            .values()
            .all(|need| need.result == Some(RunResult::Success))
    }

    /// Whether a job this job depends on failed
    pub fn needs_failed(&self) -> bool {
        self.needs
            .values()
            .any(|need| need.result == Some(RunResult::Failure))
    }
}
