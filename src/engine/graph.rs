//! Planned job graph
//!
//! The Engine's plan: ordered stages of job runs, each run carrying the
//! fields the override plan mutates before execution. Step result and step
//! output overrides are kept as ordered rule lists the Engine consults when
//! it needs a step's result or outputs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::result::RunResult;
use crate::identity::{Addressable, Identity};
use crate::workflow::{Job, JobKind, Step, Workflow};

/// A host path mounted into the job container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    pub source: PathBuf,
    pub destination: String,
}

/// Predicate over a planned step
pub type StepPredicate = Arc<dyn Fn(&PlannedStep) -> bool + Send + Sync>;

/// Predicate over a planned job run
pub type JobPredicate = Arc<dyn Fn(&JobRun) -> bool + Send + Sync>;

/// Forces `result` on every step the predicate accepts; matched steps are not executed
#[derive(Clone)]
pub struct StepResultRule {
    pub result: RunResult,
    pub predicate: StepPredicate,
}

impl StepResultRule {
    pub fn new<F>(result: RunResult, predicate: F) -> Self
    where
        F: Fn(&PlannedStep) -> bool + Send + Sync + 'static,
    {
        Self {
            result,
            predicate: Arc::new(predicate),
        }
    }

    pub fn evaluate(&self, step: &PlannedStep) -> Option<RunResult> {
        (self.predicate)(step).then_some(self.result)
    }
}

impl fmt::Debug for StepResultRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepResultRule")
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// Output overrides keyed by step identifier or display name, in registration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutputTable {
    entries: Vec<(String, HashMap<String, String>)>,
}

impl StepOutputTable {
    /// Merge `outputs` into the entry for `step`, key by key
    pub fn merge(&mut self, step: &str, outputs: HashMap<String, String>) {
        match self.entries.iter_mut().find(|(name, _)| name == step) {
            Some((_, existing)) => existing.extend(outputs),
            None => self.entries.push((step.to_string(), outputs)),
        }
    }

    /// Outputs registered for `step`, if any
    pub fn for_step(&self, step: &PlannedStep) -> Option<&HashMap<String, String>> {
        self.entries
            .iter()
            .find(|(name, _)| step.identity().matches(name))
            .map(|(_, outputs)| outputs)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A step of a planned job run
#[derive(Debug, Clone)]
pub struct PlannedStep {
    /// Step identifier; the step's position when the workflow declares none
    pub id: String,
    pub step: Step,
    /// Label reported for the step regardless of what its body does
    pub result: Option<RunResult>,
    pub env_overrides: HashMap<String, String>,
    /// Do not run the step body; the `if` condition still decides the result
    pub skip_execution: bool,
}

impl PlannedStep {
    pub fn new(index: usize, step: Step) -> Self {
        Self {
            id: step.id.clone().unwrap_or_else(|| index.to_string()),
            step,
            result: None,
            env_overrides: HashMap::new(),
            skip_execution: false,
        }
    }

    pub fn name(&self) -> String {
        self.step.display_name()
    }
}

impl Addressable for PlannedStep {
    fn identity(&self) -> Identity<'_> {
        Identity::new(&self.id, self.step.name.as_deref())
    }
}

/// A runnable job record: one per job, or one per matrix cell
#[derive(Debug, Clone)]
pub struct JobRun {
    pub job_id: String,
    pub job: Job,
    pub matrix: BTreeMap<String, String>,
    pub workflow_name: String,
    /// Position of the workflow among those planned together; `needs` resolve within it
    pub workflow_index: usize,
    pub workflow_env: HashMap<String, String>,
    /// Defaults of the inputs the workflow declares
    pub input_defaults: HashMap<String, String>,
    pub steps: Vec<PlannedStep>,
    /// Forced job result; the Engine does not execute a job that has one
    pub result: Option<RunResult>,
    /// Forced job outputs, applied over the evaluated ones
    pub outputs: HashMap<String, String>,
    pub env: HashMap<String, String>,
    pub container_image: Option<String>,
    /// Files to place in the job container, keyed by container path
    pub files: BTreeMap<String, Vec<u8>>,
    pub binds: Vec<BindMount>,
    pub step_results: Vec<StepResultRule>,
    pub step_outputs: StepOutputTable,
}

impl JobRun {
    pub fn new(
        job_id: impl Into<String>,
        job: Job,
        matrix: BTreeMap<String, String>,
        workflow: &Workflow,
    ) -> Self {
        let steps = job
            .steps
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, step)| PlannedStep::new(index, step))
            .collect();

        Self {
            job_id: job_id.into(),
            job,
            matrix,
            workflow_name: workflow.display_name().to_string(),
            workflow_index: 0,
            workflow_env: workflow.env.clone(),
            input_defaults: workflow.on.input_defaults(),
            steps,
            result: None,
            outputs: HashMap::new(),
            env: HashMap::new(),
            container_image: None,
            files: BTreeMap::new(),
            binds: Vec::new(),
            step_results: Vec::new(),
            step_outputs: StepOutputTable::default(),
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.job.name.as_deref()
    }

    pub fn kind(&self) -> JobKind {
        self.job.kind()
    }

    /// Result forced on `step` by the first matching rule
    pub fn forced_step_result(&self, step: &PlannedStep) -> Option<RunResult> {
        self.step_results
            .iter()
            .find_map(|rule| rule.evaluate(step))
    }

    /// Outputs forced on `step`
    pub fn forced_step_outputs(&self, step: &PlannedStep) -> Option<&HashMap<String, String>> {
        self.step_outputs.for_step(step)
    }
}

impl Addressable for JobRun {
    fn identity(&self) -> Identity<'_> {
        Identity::new(&self.job_id, self.display_name())
    }
}

/// Runs that may execute together once the previous stages completed
#[derive(Debug, Clone, Default)]
pub struct Stage {
    pub runs: Vec<JobRun>,
}

/// The Engine's plan
#[derive(Debug, Clone, Default)]
pub struct PlannedGraph {
    pub stages: Vec<Stage>,
}

impl PlannedGraph {
    pub fn runs(&self) -> impl Iterator<Item = &JobRun> {
        self.stages.iter().flat_map(|stage| stage.runs.iter())
    }

    pub fn runs_mut(&mut self) -> impl Iterator<Item = &mut JobRun> {
        self.stages.iter_mut().flat_map(|stage| stage.runs.iter_mut())
    }

    /// Planned job identifiers, once each, in stage order
    pub fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for run in self.runs() {
            if !ids.contains(&run.job_id) {
                ids.push(run.job_id.clone());
            }
        }
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.runs().next().is_none()
    }
}
