//! Local engine - runs planned workflows on the host
//!
//! This is the bundled engine that:
//! 1. Loads and plans workflow files
//! 2. Executes stages in order, the job runs of a stage concurrently
//! 3. Evaluates job and step conditions
//! 4. Runs script steps and records action step inputs
//! 5. Calls local reusable workflows as child runs
//! 6. Honours the overrides installed on the planned graph
//!
//! Containers are not started: the job image is recorded, injected files are
//! written under a per-job directory exposed as `HARNESS_CONTAINER_ROOT`, and
//! bind mounts are recorded.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

use crate::config::HarnessConfig;
use crate::engine::error::EngineError;
use crate::engine::graph::{JobRun, PlannedGraph, PlannedStep};
use crate::engine::planner;
use crate::engine::result::{RunRecord, RunResult, StepRecord};
use crate::engine::shell::{self, Script};
use crate::engine::{Engine, Execution, Interpolate, Selection};
use crate::github_env::{input_env_key, runner_defaults};
use crate::workflow::expressions::evaluate_params;
use crate::workflow::*;

/// Environment variable pointing at the directory that stands in for the job container
pub const CONTAINER_ROOT_VAR: &str = "HARNESS_CONTAINER_ROOT";

const MAX_NESTING: usize = 10;

/// Host-process engine
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEngine;

/// Values shared by every job of one workflow run
struct RunScope<'a> {
    config: &'a HarnessConfig,
    inputs: HashMap<String, String>,
    secrets: HashMap<String, String>,
    run_id: String,
    depth: usize,
}

impl<'a> RunScope<'a> {
    fn root(config: &'a HarnessConfig) -> Self {
        let mut secrets = config.secrets().clone();
        if let Some(token) = config.token() {
            secrets
                .entry("GITHUB_TOKEN".to_string())
                .or_insert_with(|| token.to_string());
        }
        Self {
            config,
            inputs: config.inputs().clone(),
            secrets,
            run_id: uuid::Uuid::new_v4().to_string(),
            depth: 0,
        }
    }
}

impl LocalEngine {
    pub fn new() -> Self {
        Self
    }

    fn execute_graph<'a>(
        &'a self,
        graph: PlannedGraph,
        scope: &'a RunScope<'a>,
    ) -> BoxFuture<'a, Vec<RunRecord>> {
        async move {
            let mut finished = FinishedJobs::new();
            let mut records = Vec::new();

            for (index, stage) in graph.stages.into_iter().enumerate() {
                debug!("Executing stage {} ({} job run(s))", index, stage.runs.len());
                let needs = &finished;
                let workflows: Vec<usize> = stage.runs.iter().map(|run| run.workflow_index).collect();
                let stage_records = join_all(
                    stage
                        .runs
                        .into_iter()
                        .map(|run| self.execute_run(run, scope, needs)),
                )
                .await;

                for (workflow, record) in workflows.into_iter().zip(&stage_records) {
                    record_need(&mut finished, workflow, record);
                }
                records.extend(stage_records);
            }

            records
        }
        .boxed()
    }

    #[instrument(skip_all, fields(job = %run.job_id))]
    async fn execute_run(
        &self,
        run: JobRun,
        scope: &RunScope<'_>,
        needs: &FinishedJobs,
    ) -> RunRecord {
        let workspace =
            std::env::temp_dir().join(format!("workflow-harness-{}", uuid::Uuid::new_v4()));
        let mut ctx = job_context(&run, scope, needs, &workspace);

        let mut record = RunRecord::new(run.job_id.clone(), resolve_name(&run, &ctx), RunResult::Success);
        record.declared_name = run.job.name.clone();
        record.kind = run.kind();
        record.matrix = run.matrix.clone();
        record.container_image = run
            .container_image
            .clone()
            .or_else(|| run.job.container.as_ref().map(|c| c.image().to_string()))
            .or_else(|| {
                scope
                    .config
                    .platform_image(&run.job.runs_on)
                    .map(str::to_string)
            });
        record.binds = run.binds.clone();
        record.masks = ctx
            .secrets
            .values()
            .filter(|secret| !secret.is_empty())
            .cloned()
            .collect();
        record.masks.sort();
        record.masks.dedup();

        if let Some(forced) = run.result {
            info!("Job '{}' result forced to {}", record.name, forced);
            record.result = forced;
            record.outputs = run.outputs.clone();
        } else {
            let condition = run.job.condition.as_deref().unwrap_or_default();
            match evaluate_condition(condition, &ctx, ConditionScope::Job) {
                Ok(true) => {
                    info!("Running job '{}'", record.name);
                    if let Err(e) = self
                        .run_job(&run, scope, &mut ctx, &mut record, &workspace)
                        .await
                    {
                        error!("Job '{}' failed: {}", record.name, e);
                        record.result = RunResult::Failure;
                    }
                }
                Ok(false) => {
                    info!("Skipping job '{}' due to condition", record.name);
                    record.result = RunResult::Skipped;
                }
                Err(e) => {
                    error!("Invalid condition on job '{}': {}", record.name, e);
                    record.result = RunResult::Failure;
                }
            }
        }

        if tokio::fs::try_exists(&workspace).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_dir_all(&workspace).await {
                warn!("Failed to remove {}: {}", workspace.display(), e);
            }
        }

        record.context = ctx;
        record.finished_at = Utc::now();
        info!("Job '{}' finished: {}", record.name, record.result);
        record
    }

    async fn run_job(
        &self,
        run: &JobRun,
        scope: &RunScope<'_>,
        ctx: &mut ExecutionContext,
        record: &mut RunRecord,
        workspace: &Path,
    ) -> Result<(), EngineError> {
        match run.kind() {
            JobKind::Default => self.run_steps(run, scope, ctx, record, workspace).await,
            JobKind::ReusableWorkflowLocal => self.run_reusable(run, scope, ctx, record).await,
            JobKind::ReusableWorkflowRemote => Err(EngineError::RemoteWorkflow(
                run.job.uses.clone().unwrap_or_default(),
            )),
        }
    }

    async fn run_reusable(
        &self,
        run: &JobRun,
        scope: &RunScope<'_>,
        ctx: &mut ExecutionContext,
        record: &mut RunRecord,
    ) -> Result<(), EngineError> {
        if scope.depth >= MAX_NESTING {
            return Err(EngineError::NestingTooDeep(MAX_NESTING));
        }
        let uses = run.job.uses.as_deref().unwrap_or_default();
        record.with_evaluated = evaluate_params(&run.job.with, ctx)?;

        let workflow = WorkflowLoader::load_file(&scope.config.workdir().join(uses))?;
        let graph = planner::plan(std::slice::from_ref(&workflow), &Selection::All)?;
        info!(
            "Calling reusable workflow '{}' from job '{}'",
            workflow.display_name(),
            record.name
        );

        let child_scope = RunScope {
            config: scope.config,
            inputs: record.with_evaluated.clone(),
            secrets: ctx.secrets.clone(),
            run_id: scope.run_id.clone(),
            depth: scope.depth + 1,
        };
        let children = self.execute_graph(graph, &child_scope).await;

        for child in &children {
            for (key, value) in &child.outputs {
                ctx.set_job_output(&child.job_id, key, value.clone());
            }
            for mask in &child.masks {
                if !record.masks.contains(mask) {
                    record.masks.push(mask.clone());
                }
            }
            record.summary.push_str(&child.summary);
        }
        if children.iter().any(|c| c.result == RunResult::Failure) {
            record.result = RunResult::Failure;
        }
        record.children = Some(children);
        record.outputs = job_outputs(run, ctx);
        Ok(())
    }

    async fn run_steps(
        &self,
        run: &JobRun,
        scope: &RunScope<'_>,
        ctx: &mut ExecutionContext,
        record: &mut RunRecord,
        workspace: &Path,
    ) -> Result<(), EngineError> {
        let container_root = workspace.join("container");
        let command_dir = workspace.join("commands");
        tokio::fs::create_dir_all(&container_root).await?;

        for (container_path, content) in &run.files {
            let destination = container_root.join(container_path.trim_start_matches('/'));
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&destination, content).await?;
            debug!("Placed {} in the job container", container_path);
        }
        ctx.set_env(CONTAINER_ROOT_VAR, container_root.display().to_string());

        let dirs = StepDirs {
            working_dir: scope.config.workdir().to_path_buf(),
            command_dir,
        };
        for planned in &run.steps {
            let step = self.run_step(run, planned, scope, ctx, record, &dirs).await;
            record.steps.push(step);
        }

        record.result = if ctx.job_failed {
            RunResult::Failure
        } else {
            RunResult::Success
        };
        record.outputs = job_outputs(run, ctx);
        Ok(())
    }

    async fn run_step(
        &self,
        run: &JobRun,
        planned: &PlannedStep,
        scope: &RunScope<'_>,
        ctx: &mut ExecutionContext,
        record: &mut RunRecord,
        dirs: &StepDirs,
    ) -> StepRecord {
        let step = &planned.step;
        let mut step_record = StepRecord::new(planned.id.clone(), planned.name(), RunResult::Success);
        step_record.kind = step.kind();

        let mut env = ctx.env.clone();
        for (key, value) in &step.env {
            env.insert(key.clone(), interpolate(value, ctx));
        }
        if let Some(uses) = &step.uses {
            match evaluate_params(&step.with, ctx) {
                Ok(inputs) => env.extend(
                    inputs
                        .into_iter()
                        .map(|(key, value)| (input_env_key(&key), value)),
                ),
                Err(e) => warn!("Failed to evaluate inputs of '{}': {}", uses, e),
            }
        }
        env.extend(planned.env_overrides.clone());

        let mut outputs = HashMap::new();
        let condition = step.condition.as_deref().unwrap_or_default();
        let mut result = match evaluate_condition(condition, ctx, ConditionScope::Step) {
            Err(e) => {
                step_record.logs = e.to_string();
                RunResult::Failure
            }
            Ok(false) => {
                info!("Skipping step '{}' due to condition", step_record.name);
                RunResult::Skipped
            }
            Ok(true) => {
                if let Some(forced) = run.forced_step_result(planned) {
                    debug!("Step '{}' result forced to {}", step_record.name, forced);
                    forced
                } else if planned.skip_execution {
                    debug!("Step '{}' not executed", step_record.name);
                    RunResult::Success
                } else {
                    info!("Executing step: {}", step_record.name);
                    match self
                        .execute_step_body(step, &env, ctx, record, dirs)
                        .await
                    {
                        Ok(body) => {
                            step_record.logs = body.logs;
                            outputs = body.outputs;
                            body.result
                        }
                        Err(e) => {
                            step_record.logs = e.to_string();
                            RunResult::Failure
                        }
                    }
                }
            }
        };

        if let Some(preset) = planned.result {
            result = preset;
        }
        if let Some(forced) = run.forced_step_outputs(planned) {
            outputs.extend(forced.clone());
        }
        for (key, value) in &outputs {
            ctx.set_output(&planned.id, key, value.clone());
        }
        ctx.step_outcomes.insert(planned.id.clone(), result);
        if result == RunResult::Failure && !step.continue_on_error {
            ctx.job_failed = true;
        }

        step_record.logs = mask(&step_record.logs, &record.masks);
        if scope.config.log_output() {
            for line in step_record.logs.lines() {
                info!(job = %record.name, step = %step_record.name, "{}", line);
            }
        }
        step_record.result = result;
        step_record.outputs = outputs;
        step_record.env_evaluated = env;
        step_record
    }

    async fn execute_step_body(
        &self,
        step: &Step,
        env: &HashMap<String, String>,
        ctx: &mut ExecutionContext,
        record: &mut RunRecord,
        dirs: &StepDirs,
    ) -> Result<StepBody, EngineError> {
        match step.kind() {
            StepKind::Run => {
                let body = interpolate(step.run.as_deref().unwrap_or_default(), ctx);
                let working_dir = match &step.working_directory {
                    Some(dir) => dirs.working_dir.join(interpolate(dir, ctx)),
                    None => dirs.working_dir.clone(),
                };
                let output = shell::run_script(&Script {
                    body: &body,
                    env,
                    working_dir: &working_dir,
                    command_dir: &dirs.command_dir,
                })
                .await?;

                ctx.merge_env(&output.env);
                for secret in output.masks {
                    if !record.masks.contains(&secret) {
                        record.masks.push(secret);
                    }
                }
                record.summary.push_str(&output.summary);

                Ok(StepBody {
                    result: if output.success {
                        RunResult::Success
                    } else {
                        RunResult::Failure
                    },
                    logs: output.logs,
                    outputs: output.outputs,
                })
            }
            StepKind::UsesActionLocal | StepKind::UsesActionRemote | StepKind::UsesDockerUrl => {
                warn!(
                    "Action '{}' is not executed by the local engine",
                    step.uses.as_deref().unwrap_or_default()
                );
                Ok(StepBody {
                    result: RunResult::Success,
                    logs: String::new(),
                    outputs: HashMap::new(),
                })
            }
            StepKind::Invalid => Err(EngineError::InvalidStep),
        }
    }
}

struct StepDirs {
    working_dir: PathBuf,
    command_dir: PathBuf,
}

struct StepBody {
    result: RunResult,
    logs: String,
    outputs: HashMap<String, String>,
}

#[async_trait]
impl Engine for LocalEngine {
    async fn plan(
        &self,
        workflow_path: &Path,
        selection: &Selection,
    ) -> anyhow::Result<PlannedGraph> {
        let workflows = WorkflowLoader::load_path(workflow_path)
            .with_context(|| format!("loading {}", workflow_path.display()))?;
        let graph = planner::plan(&workflows, selection)?;
        info!(
            "Planned {} job run(s) in {} stage(s)",
            graph.runs().count(),
            graph.stages.len()
        );
        Ok(graph)
    }

    async fn execute(&self, graph: PlannedGraph, config: &HarnessConfig) -> Execution {
        let scope = RunScope::root(config);
        let records = self.execute_graph(graph, &scope).await;

        let mut failed: Vec<String> = Vec::new();
        for record in records.iter().filter(|r| r.result == RunResult::Failure) {
            if !failed.contains(&record.job_id) {
                failed.push(record.job_id.clone());
            }
        }

        Execution {
            records,
            error: (!failed.is_empty()).then(|| EngineError::JobsFailed(failed).into()),
        }
    }
}

impl Interpolate for LocalEngine {
    fn interpolate(&self, text: &str, context: &ExecutionContext) -> String {
        interpolate(text, context)
    }
}

fn job_context(
    run: &JobRun,
    scope: &RunScope<'_>,
    needs: &FinishedJobs,
    workspace: &Path,
) -> ExecutionContext {
    let config = scope.config;
    let mut ctx = ExecutionContext::new();
    ctx.run_id = scope.run_id.clone();
    ctx.current_job = Some(run.job_id.clone());
    ctx.event_name = config.event_name().to_string();
    ctx.secrets = scope.secrets.clone();
    ctx.vars = config.vars().clone();
    ctx.inputs = run.input_defaults.clone();
    ctx.inputs.extend(scope.inputs.clone());
    ctx.matrix = run.matrix.clone();
    ctx.needs = run
        .job
        .needs
        .iter()
        .filter_map(|id| {
            needs
                .get(&(run.workflow_index, id.clone()))
                .map(|need| (id.clone(), need.clone()))
        })
        .collect();

    ctx.env = runner_defaults(config, &run.job_id, workspace);
    ctx.merge_env(config.env());
    for (key, value) in &run.workflow_env {
        let value = interpolate(value, &ctx);
        ctx.set_env(key, value);
    }
    if let Some(Container::Spec { env, .. }) = &run.job.container {
        for (key, value) in env {
            let value = interpolate(value, &ctx);
            ctx.set_env(key, value);
        }
    }
    for (key, value) in &run.job.env {
        let value = interpolate(value, &ctx);
        ctx.set_env(key, value);
    }
    ctx.merge_env(&run.env);
    ctx
}

/// Run name: the interpolated display name, with matrix values when it does not use them
fn resolve_name(run: &JobRun, ctx: &ExecutionContext) -> String {
    let values = run.matrix.values().cloned().collect::<Vec<_>>().join(", ");
    match run.display_name() {
        Some(name) if run.matrix.is_empty() || name.contains("${{") => interpolate(name, ctx),
        Some(name) => format!("{} ({})", interpolate(name, ctx), values),
        None if run.matrix.is_empty() => run.job_id.clone(),
        None => format!("{} ({})", run.job_id, values),
    }
}

fn job_outputs(run: &JobRun, ctx: &ExecutionContext) -> HashMap<String, String> {
    let mut outputs: HashMap<String, String> = run
        .job
        .outputs
        .iter()
        .map(|(key, expr)| (key.clone(), interpolate(expr, ctx)))
        .collect();
    outputs.extend(run.outputs.clone());
    outputs
}

/// Finished jobs by workflow position and job id
type FinishedJobs = HashMap<(usize, String), NeedContext>;

/// Fold a finished run into what its dependents see; matrix cells share one entry
fn record_need(finished: &mut FinishedJobs, workflow: usize, record: &RunRecord) {
    let need = finished
        .entry((workflow, record.job_id.clone()))
        .or_default();
    need.result = Some(match (need.result, record.result) {
        (None, result) => result,
        (Some(RunResult::Failure), _) | (_, RunResult::Failure) => RunResult::Failure,
        (Some(RunResult::Success), RunResult::Success) => RunResult::Success,
        _ => RunResult::Skipped,
    });
    need.outputs.extend(record.outputs.clone());
}

fn mask(text: &str, masks: &[String]) -> String {
    masks
        .iter()
        .filter(|secret| !secret.is_empty())
        .fold(text.to_string(), |text, secret| text.replace(secret.as_str(), "***"))
}
