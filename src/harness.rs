//! Test harness entry point
//!
//! A [`Harness`] plans a workflow through an [`Engine`], hands back a
//! [`PlannedRun`] on which overrides are queued, and turns the execution
//! into an immutable [`Results`] index.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::engine::{Engine, Interpolate, JobRun, LocalEngine, PlannedGraph, RunResult};
use crate::error::HarnessError;
use crate::plan::{JobOverrides, JobResultRule, Override, OverridePlan};
use crate::results::Results;

/// Plans and runs workflows under test
#[derive(Debug)]
pub struct Harness<E: Engine = LocalEngine> {
    engine: Arc<E>,
    config: HarnessConfig,
}

impl Harness<LocalEngine> {
    /// Harness over the bundled host-process engine
    pub fn local(config: HarnessConfig) -> Self {
        Self::new(LocalEngine::new(), config)
    }
}

impl<E: Engine + 'static> Harness<E> {
    pub fn new(engine: E, config: HarnessConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            config,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Plan the configured workflows for the configured selection
    pub async fn plan(&self) -> Result<PlannedRun<E>, HarnessError> {
        let selection = self.config.selection();
        info!(
            "Planning {} ({:?})",
            self.config.workflow_path().display(),
            selection
        );
        let graph = self
            .engine
            .plan(self.config.workflow_path(), &selection)
            .await
            .map_err(HarnessError::Planning)?;

        Ok(PlannedRun {
            engine: Arc::clone(&self.engine),
            config: self.config.clone(),
            graph,
            overrides: OverridePlan::new(),
        })
    }
}

/// A planned graph and the overrides queued against it
pub struct PlannedRun<E: Engine = LocalEngine> {
    engine: Arc<E>,
    config: HarnessConfig,
    graph: PlannedGraph,
    overrides: OverridePlan,
}

impl<E: Engine + 'static> PlannedRun<E> {
    pub fn graph(&self) -> &PlannedGraph {
        &self.graph
    }

    /// Identifiers of every planned job, in stage order
    pub fn job_ids(&self) -> Vec<String> {
        self.graph.job_ids()
    }

    pub fn overrides(&self) -> &OverridePlan {
        &self.overrides
    }

    /// Queue overrides for a job, by identifier or display name
    pub fn job(&mut self, name: &str) -> Result<JobOverrides<'_>, HarnessError> {
        JobOverrides::new(&self.graph, &mut self.overrides, name)
    }

    /// Report `result` for every planned job the predicate accepts
    pub fn set_job_results<F>(&mut self, result: RunResult, predicate: F) -> &mut Self
    where
        F: Fn(&JobRun) -> bool + Send + Sync + 'static,
    {
        self.overrides
            .push(Override::ForceJobResults(JobResultRule::new(result, predicate)));
        self
    }

    /// Apply the queued overrides, run the engine and index its records
    ///
    /// Configuration errors abort before the engine is called. An error the
    /// engine reports alongside its records is kept in
    /// [`Results::execution_error`].
    pub async fn execute(self) -> Result<Results, HarnessError> {
        let PlannedRun {
            engine,
            config,
            mut graph,
            overrides,
        } = self;

        overrides.apply(&mut graph)?;

        let execution = engine.execute(graph, &config).await;
        if let Some(err) = &execution.error {
            warn!("Engine reported an error: {:#}", err);
        }

        let interpolator: Arc<dyn Interpolate> = engine;
        Ok(Results::new(
            execution.records,
            interpolator,
            execution.error,
        ))
    }
}

impl<E: Engine> std::fmt::Debug for PlannedRun<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedRun")
            .field("config", &self.config)
            .field("graph", &self.graph)
            .field("overrides", &self.overrides.len())
            .finish()
    }
}
