//! Execution result types
//!
//! One [`RunRecord`] is produced per executed job run (one per matrix cell),
//! with nested records for the jobs of a called reusable workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::engine::graph::BindMount;
use crate::identity::{Addressable, Identity};
use crate::workflow::{ExecutionContext, JobKind, StepKind};

/// Terminal label of a job or step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunResult {
    Success,
    Failure,
    Skipped,
}

impl RunResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunResult::Success => "success",
            RunResult::Failure => "failure",
            RunResult::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunResult::Success),
            "failure" => Ok(RunResult::Failure),
            "skipped" => Ok(RunResult::Skipped),
            other => Err(format!("unknown result: {}", other)),
        }
    }
}

/// Final state of a step
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub id: String,
    /// Declared display name, before interpolation
    pub name: String,
    pub kind: StepKind,
    pub result: RunResult,
    pub outputs: HashMap<String, String>,
    /// Raw log text
    pub logs: String,
    /// Environment the step ran with, including `INPUT_*` entries of action steps
    pub env_evaluated: HashMap<String, String>,
}

impl StepRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, result: RunResult) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: StepKind::Run,
            result,
            outputs: HashMap::new(),
            logs: String::new(),
            env_evaluated: HashMap::new(),
        }
    }
}

impl Addressable for StepRecord {
    fn identity(&self) -> Identity<'_> {
        Identity::new(&self.id, Some(&self.name))
    }
}

/// Final state of an executed job run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub job_id: String,
    /// Resolved run name (interpolated, with matrix values)
    pub name: String,
    /// Display name as declared in the workflow
    pub declared_name: Option<String>,
    pub kind: JobKind,
    pub matrix: BTreeMap<String, String>,
    pub result: RunResult,
    pub outputs: HashMap<String, String>,
    pub steps: Vec<StepRecord>,
    /// Records of the called workflow's jobs, in execution order
    pub children: Option<Vec<RunRecord>>,
    /// Values redacted from the logs
    pub masks: Vec<String>,
    /// Evaluated `with:` inputs of a reusable workflow call
    pub with_evaluated: HashMap<String, String>,
    pub summary: String,
    pub container_image: Option<String>,
    pub binds: Vec<BindMount>,
    /// Runtime context the job finished with
    pub context: ExecutionContext,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(job_id: impl Into<String>, name: impl Into<String>, result: RunResult) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            name: name.into(),
            declared_name: None,
            kind: JobKind::Default,
            matrix: BTreeMap::new(),
            result,
            outputs: HashMap::new(),
            steps: Vec::new(),
            children: None,
            masks: Vec::new(),
            with_evaluated: HashMap::new(),
            summary: String::new(),
            container_image: None,
            binds: Vec::new(),
            context: ExecutionContext::default(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Identity shared by every cell of a matrix job
    pub fn family_identity(&self) -> Identity<'_> {
        Identity::new(&self.job_id, self.declared_name.as_deref())
    }
}

impl Addressable for RunRecord {
    fn identity(&self) -> Identity<'_> {
        Identity::new(&self.job_id, Some(&self.name))
    }
}
