//! Override plan
//!
//! Pending mutations of a planned graph, queued through [`JobOverrides`] and
//! [`StepOverrides`] and applied once, right before execution. Applying is
//! all or nothing: every target is resolved and every injected file is read
//! before the graph is touched.

mod builder;

pub use builder::{JobOverrides, StepOverrides};

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::{
    BindMount, JobPredicate, JobRun, PlannedGraph, RunResult, StepResultRule,
};
use crate::error::{EntityKind, HarnessError};
use crate::identity::{self, Addressable};

/// What an override applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Job(String),
    Step { job: String, step: String },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Job(job) => write!(f, "job '{}'", job),
            Target::Step { job, step } => write!(f, "step '{}' of job '{}'", step, job),
        }
    }
}

/// Forces `result` on every planned job run the predicate accepts
#[derive(Clone)]
pub struct JobResultRule {
    pub result: RunResult,
    pub predicate: JobPredicate,
}

impl JobResultRule {
    pub fn new<F>(result: RunResult, predicate: F) -> Self
    where
        F: Fn(&JobRun) -> bool + Send + Sync + 'static,
    {
        Self {
            result,
            predicate: Arc::new(predicate),
        }
    }
}

impl fmt::Debug for JobResultRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobResultRule")
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// A pending mutation
#[derive(Debug, Clone)]
pub enum Override {
    /// Final label of a job (not executed) or a step (executed as usual)
    ForceResult { target: Target, result: RunResult },
    ForceJobResults(JobResultRule),
    /// Replaces any step result rule registered earlier for the job
    ForceStepResult { job: String, rule: StepResultRule },
    SkipStep {
        job: String,
        step: String,
        also_set_result: bool,
    },
    SetOutput {
        target: Target,
        key: String,
        value: String,
    },
    SetStepOutputs {
        job: String,
        step: String,
        outputs: HashMap<String, String>,
    },
    SetEnv {
        target: Target,
        env: HashMap<String, String>,
    },
    SetContainerImage { job: String, image: String },
    CopyFileIntoContainer {
        job: String,
        host_path: PathBuf,
        container_path: String,
    },
    AddBindMount {
        job: String,
        source: PathBuf,
        destination: String,
    },
}

impl Override {
    fn target(&self) -> Option<Target> {
        match self {
            Override::ForceResult { target, .. }
            | Override::SetOutput { target, .. }
            | Override::SetEnv { target, .. } => Some(target.clone()),
            Override::ForceJobResults(_) => None,
            Override::SkipStep { job, step, .. } | Override::SetStepOutputs { job, step, .. } => {
                Some(Target::Step {
                    job: job.clone(),
                    step: step.clone(),
                })
            }
            Override::ForceStepResult { job, .. }
            | Override::SetContainerImage { job, .. }
            | Override::CopyFileIntoContainer { job, .. }
            | Override::AddBindMount { job, .. } => Some(Target::Job(job.clone())),
        }
    }
}

/// Ordered list of pending overrides
#[derive(Debug, Clone, Default)]
pub struct OverridePlan {
    overrides: Vec<Override>,
}

impl OverridePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: Override) {
        debug!("Queued override: {:?}", entry);
        self.overrides.push(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Override> {
        self.overrides.iter()
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// Apply every override to `graph`, in queue order
    ///
    /// Fails without mutating the graph when a target does not resolve or an
    /// injected file cannot be read.
    pub fn apply(self, graph: &mut PlannedGraph) -> Result<(), HarnessError> {
        let files = self.validate(graph)?;
        info!("Applying {} override(s)", self.overrides.len());

        for (index, entry) in self.overrides.into_iter().enumerate() {
            match entry {
                Override::ForceResult {
                    target: Target::Job(job),
                    result,
                } => {
                    for run in runs_named(graph, &job) {
                        run.result = Some(result);
                    }
                }
                Override::ForceResult {
                    target: Target::Step { job, step },
                    result,
                } => {
                    for_each_step(graph, &job, &step, |planned| planned.result = Some(result))?;
                }
                Override::ForceJobResults(rule) => {
                    for run in graph.runs_mut() {
                        if (rule.predicate)(run) {
                            run.result = Some(rule.result);
                        }
                    }
                }
                Override::ForceStepResult { job, rule } => {
                    for run in runs_named(graph, &job) {
                        run.step_results.clear();
                        run.step_results.push(rule.clone());
                    }
                }
                Override::SkipStep {
                    job,
                    step,
                    also_set_result,
                } => {
                    for_each_step(graph, &job, &step, |planned| {
                        planned.skip_execution = true;
                        if also_set_result {
                            planned.result = Some(RunResult::Skipped);
                        }
                    })?;
                }
                Override::SetOutput {
                    target: Target::Job(job),
                    key,
                    value,
                } => {
                    for run in runs_named(graph, &job) {
                        run.outputs.insert(key.clone(), value.clone());
                    }
                }
                Override::SetOutput {
                    target: Target::Step { job, step },
                    key,
                    value,
                } => {
                    let outputs = HashMap::from([(key, value)]);
                    for run in runs_named(graph, &job) {
                        run.step_outputs.merge(&step, outputs.clone());
                    }
                }
                Override::SetStepOutputs { job, step, outputs } => {
                    for run in runs_named(graph, &job) {
                        run.step_outputs.merge(&step, outputs.clone());
                    }
                }
                Override::SetEnv {
                    target: Target::Job(job),
                    env,
                } => {
                    for run in runs_named(graph, &job) {
                        run.env.extend(env.clone());
                    }
                }
                Override::SetEnv {
                    target: Target::Step { job, step },
                    env,
                } => {
                    for_each_step(graph, &job, &step, |planned| {
                        planned.env_overrides.extend(env.clone())
                    })?;
                }
                Override::SetContainerImage { job, image } => {
                    for run in runs_named(graph, &job) {
                        run.container_image = Some(image.clone());
                    }
                }
                Override::CopyFileIntoContainer {
                    job,
                    container_path,
                    ..
                } => {
                    let content = files.get(&index).cloned().unwrap_or_default();
                    for run in runs_named(graph, &job) {
                        run.files.insert(container_path.clone(), content.clone());
                    }
                }
                Override::AddBindMount {
                    job,
                    source,
                    destination,
                } => {
                    for run in runs_named(graph, &job) {
                        run.binds.push(BindMount {
                            source: source.clone(),
                            destination: destination.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Resolve every target and read every injected file
    fn validate(&self, graph: &PlannedGraph) -> Result<HashMap<usize, Vec<u8>>, HarnessError> {
        let mut files = HashMap::new();

        for (index, entry) in self.overrides.iter().enumerate() {
            match entry.target() {
                Some(Target::Job(job)) => {
                    resolve_job_id(graph, &job)?;
                }
                Some(Target::Step { job, step }) => {
                    let job_id = resolve_job_id(graph, &job)?;
                    for run in graph.runs().filter(|run| run.job_id == job_id) {
                        identity::resolve(&step, EntityKind::Step, &run.steps)?;
                    }
                }
                None => {}
            }

            if let Override::CopyFileIntoContainer {
                host_path,
                container_path,
                ..
            } = entry
            {
                if container_path.is_empty() {
                    return Err(HarnessError::Configuration(format!(
                        "no container path given for {}",
                        host_path.display()
                    )));
                }
                let content =
                    std::fs::read(host_path).map_err(|source| HarnessError::InjectedFile {
                        path: host_path.clone(),
                        source,
                    })?;
                files.insert(index, content);
            }
        }

        Ok(files)
    }
}

/// Identifier of the planned job answering to `name`
///
/// An identifier match wins over a display name match, so a job whose
/// display name equals another job's identifier never captures its overrides.
pub(crate) fn resolve_job_id(graph: &PlannedGraph, name: &str) -> Result<String, HarnessError> {
    graph
        .runs()
        .find(|run| run.job_id == name)
        .or_else(|| graph.runs().find(|run| run.identity().matches(name)))
        .map(|run| run.job_id.clone())
        .ok_or_else(|| HarnessError::not_found(EntityKind::Job, name))
}

/// Every run of the job answering to `name`; one per matrix cell
fn runs_named<'g>(graph: &'g mut PlannedGraph, name: &str) -> impl Iterator<Item = &'g mut JobRun> + 'g {
    let job_id = resolve_job_id(graph, name).ok();
    graph
        .runs_mut()
        .filter(move |run| job_id.as_deref() == Some(run.job_id.as_str()))
}

fn for_each_step<F>(
    graph: &mut PlannedGraph,
    job: &str,
    step: &str,
    mut apply: F,
) -> Result<(), HarnessError>
where
    F: FnMut(&mut crate::engine::PlannedStep),
{
    for run in runs_named(graph, job) {
        let position = identity::position(step, EntityKind::Step, &run.steps)?;
        apply(&mut run.steps[position]);
    }
    Ok(())
}
