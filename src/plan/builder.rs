use std::collections::HashMap;
use std::path::PathBuf;

use super::{resolve_job_id, Override, OverridePlan, Target};
use crate::engine::{PlannedGraph, PlannedStep, RunResult, StepResultRule};
use crate::error::{EntityKind, HarnessError};
use crate::identity;

/// Overrides scoped to one planned job
///
/// Every matrix cell of the job receives the overrides.
#[derive(Debug)]
pub struct JobOverrides<'a> {
    graph: &'a PlannedGraph,
    plan: &'a mut OverridePlan,
    job: String,
}

impl<'a> JobOverrides<'a> {
    /// Resolve `name` against the planned jobs
    pub fn new(
        graph: &'a PlannedGraph,
        plan: &'a mut OverridePlan,
        name: &str,
    ) -> Result<Self, HarnessError> {
        let job = resolve_job_id(graph, name)?;
        Ok(Self { graph, plan, job })
    }

    /// Identifier of the job
    pub fn id(&self) -> &str {
        &self.job
    }

    /// Report `result` for the job without executing it
    pub fn set_result(self, result: RunResult) -> Self {
        self.plan.push(Override::ForceResult {
            target: Target::Job(self.job.clone()),
            result,
        });
        self
    }

    /// Force a job output; applied over the outputs the job evaluates
    pub fn set_output(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.plan.push(Override::SetOutput {
            target: Target::Job(self.job.clone()),
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Force `result` on every step the predicate accepts; those steps are not executed
    ///
    /// Replaces the predicate registered by an earlier call for this job.
    pub fn set_step_results<F>(self, result: RunResult, predicate: F) -> Self
    where
        F: Fn(&PlannedStep) -> bool + Send + Sync + 'static,
    {
        self.plan.push(Override::ForceStepResult {
            job: self.job.clone(),
            rule: StepResultRule::new(result, predicate),
        });
        self
    }

    /// Environment variables of the job
    pub fn set_env<K, V>(self, env: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.plan.push(Override::SetEnv {
            target: Target::Job(self.job.clone()),
            env: collect(env),
        });
        self
    }

    pub fn set_container_image(self, image: impl Into<String>) -> Self {
        self.plan.push(Override::SetContainerImage {
            job: self.job.clone(),
            image: image.into(),
        });
        self
    }

    /// Place a host file in the job container; the file is read when the plan is applied
    pub fn copy_file(self, host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        self.plan.push(Override::CopyFileIntoContainer {
            job: self.job.clone(),
            host_path: host_path.into(),
            container_path: container_path.into(),
        });
        self
    }

    pub fn add_bind_mount(self, source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        self.plan.push(Override::AddBindMount {
            job: self.job.clone(),
            source: source.into(),
            destination: destination.into(),
        });
        self
    }

    /// Overrides scoped to one step of this job
    pub fn step(self, name: &str) -> Result<StepOverrides<'a>, HarnessError> {
        let run = self
            .graph
            .runs()
            .find(|run| run.job_id == self.job)
            .ok_or_else(|| HarnessError::not_found(EntityKind::Job, &self.job))?;
        let step = identity::resolve(name, EntityKind::Step, &run.steps)?;
        let step = step.id.clone();
        Ok(StepOverrides { job: self, step })
    }
}

/// Overrides scoped to one step of a planned job
#[derive(Debug)]
pub struct StepOverrides<'a> {
    job: JobOverrides<'a>,
    step: String,
}

impl<'a> StepOverrides<'a> {
    /// Identifier of the step
    pub fn id(&self) -> &str {
        &self.step
    }

    fn target(&self) -> Target {
        Target::Step {
            job: self.job.job.clone(),
            step: self.step.clone(),
        }
    }

    /// Report `result` for the step, whatever its body does
    pub fn set_result(self, result: RunResult) -> Self {
        self.job.plan.push(Override::ForceResult {
            target: self.target(),
            result,
        });
        self
    }

    /// Do not execute the step body; the step's `if` condition still decides its result
    pub fn skip(self) -> Self {
        self.job.plan.push(Override::SkipStep {
            job: self.job.job.clone(),
            step: self.step.clone(),
            also_set_result: false,
        });
        self
    }

    /// Do not execute the step body and report it as skipped
    pub fn mark_skipped(self) -> Self {
        self.job.plan.push(Override::SkipStep {
            job: self.job.job.clone(),
            step: self.step.clone(),
            also_set_result: true,
        });
        self
    }

    /// Force one output; merged with outputs set earlier for this step
    pub fn set_output(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.job.plan.push(Override::SetOutput {
            target: self.target(),
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Force several outputs; merged with outputs set earlier for this step
    pub fn set_outputs<K, V>(self, outputs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.job.plan.push(Override::SetStepOutputs {
            job: self.job.job.clone(),
            step: self.step.clone(),
            outputs: collect(outputs),
        });
        self
    }

    /// Environment variables of the step, over the job's
    pub fn set_env<K, V>(self, env: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.job.plan.push(Override::SetEnv {
            target: self.target(),
            env: collect(env),
        });
        self
    }

    /// Back to the job scope
    pub fn job(self) -> JobOverrides<'a> {
        self.job
    }
}

fn collect<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> HashMap<String, String>
where
    K: Into<String>,
    V: Into<String>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
