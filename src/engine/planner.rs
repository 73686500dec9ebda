//! Job planner
//!
//! Builds a directed acyclic graph from the jobs of each workflow based on
//! their `needs` dependencies, computes execution levels, and expands
//! `strategy.matrix` into one job run per matrix cell. Levels of different
//! workflows are merged by index into the stages of a [`PlannedGraph`].

use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::engine::graph::{JobRun, PlannedGraph, Stage};
use crate::engine::Selection;
use crate::workflow::{yaml_to_string, Job, Workflow};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Job '{0}' not found in any workflow")]
    UnknownJob(String),

    #[error("Job '{job}' depends on non-existent job '{dependency}'")]
    MissingDependency { job: String, dependency: String },

    #[error("Cyclic dependency detected between jobs: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("Invalid matrix for job '{job}': {reason}")]
    InvalidMatrix { job: String, reason: String },
}

/// Plan the selected jobs of `workflows`
pub fn plan(workflows: &[Workflow], selection: &Selection) -> Result<PlannedGraph, PlanError> {
    if let Selection::Job(name) = selection {
        if !workflows.iter().any(|w| find_job(w, name).is_some()) {
            return Err(PlanError::UnknownJob(name.clone()));
        }
    }

    let mut stages: Vec<Stage> = Vec::new();
    for (workflow_index, workflow) in workflows.iter().enumerate() {
        let selected = match selection {
            Selection::All => workflow.jobs.keys().cloned().collect(),
            Selection::Event(event) if workflow.on.has_event(event) => {
                workflow.jobs.keys().cloned().collect()
            }
            Selection::Event(_) => BTreeSet::new(),
            Selection::Job(name) => match find_job(workflow, name) {
                Some(job_id) => with_needs(workflow, job_id)?,
                None => BTreeSet::new(),
            },
        };
        if selected.is_empty() {
            continue;
        }

        let levels = execution_levels(workflow, &selected)?;
        debug!(
            "Planned workflow '{}' in {} level(s): {:?}",
            workflow.display_name(),
            levels.len(),
            levels
        );

        for (index, level) in levels.into_iter().enumerate() {
            if stages.len() <= index {
                stages.push(Stage::default());
            }
            for job_id in level {
                let job = &workflow.jobs[&job_id];
                for cell in expand_matrix(&job_id, job)? {
                    let mut run = JobRun::new(job_id.clone(), job.clone(), cell, workflow);
                    run.workflow_index = workflow_index;
                    stages[index].runs.push(run);
                }
            }
        }
    }

    Ok(PlannedGraph { stages })
}

/// Identifier of the job answering to `name`, by identifier first, then display name
fn find_job<'a>(workflow: &'a Workflow, name: &str) -> Option<&'a String> {
    workflow
        .jobs
        .get_key_value(name)
        .map(|(id, _)| id)
        .or_else(|| {
            workflow
                .jobs
                .iter()
                .find(|(_, job)| job.name.as_deref() == Some(name))
                .map(|(id, _)| id)
        })
}

/// `job_id` and every job it transitively needs
fn with_needs(workflow: &Workflow, job_id: &str) -> Result<BTreeSet<String>, PlanError> {
    let mut selected = BTreeSet::new();
    let mut pending = vec![job_id.to_string()];

    while let Some(id) = pending.pop() {
        if !selected.insert(id.clone()) {
            continue;
        }
        let job = workflow
            .jobs
            .get(&id)
            .ok_or_else(|| PlanError::UnknownJob(id.clone()))?;
        for dep in &job.needs {
            if !workflow.jobs.contains_key(dep) {
                return Err(PlanError::MissingDependency {
                    job: id.clone(),
                    dependency: dep.clone(),
                });
            }
            pending.push(dep.clone());
        }
    }

    Ok(selected)
}

fn execution_levels(
    workflow: &Workflow,
    selected: &BTreeSet<String>,
) -> Result<Vec<Vec<String>>, PlanError> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for name in selected {
        let job = &workflow.jobs[name];
        in_degree.entry(name.as_str()).or_insert(0);
        for dep in &job.needs {
            if !selected.contains(dep) {
                return Err(PlanError::MissingDependency {
                    job: name.clone(),
                    dependency: dep.clone(),
                });
            }
            *in_degree.entry(name.as_str()).or_insert(0) += 1;
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(name.as_str());
        }
    }

    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut current_level: Vec<String> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&name, _)| name.to_string())
        .collect();

    current_level.sort();

    while !current_level.is_empty() {
        levels.push(current_level.clone());

        let mut next_level = Vec::new();
        for name in &current_level {
            if let Some(deps) = dependents.get(name.as_str()) {
                for &dep in deps {
                    if let Some(degree) = in_degree.get_mut(dep) {
                        *degree -= 1;
                        if *degree == 0 {
                            next_level.push(dep.to_string());
                        }
                    }
                }
            }
        }
        next_level.sort();
        current_level = next_level;
    }

    let total_processed: usize = levels.iter().map(|l| l.len()).sum();
    if total_processed != selected.len() {
        let mut stuck: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        stuck.sort();
        return Err(PlanError::CyclicDependency(stuck));
    }

    Ok(levels)
}

/// Matrix cells of a job; a job without a matrix has one empty cell
pub fn expand_matrix(job_id: &str, job: &Job) -> Result<Vec<BTreeMap<String, String>>, PlanError> {
    let Some(matrix) = job.strategy.as_ref().and_then(|s| s.matrix.as_ref()) else {
        return Ok(vec![BTreeMap::new()]);
    };
    let invalid = |reason: String| PlanError::InvalidMatrix {
        job: job_id.to_string(),
        reason,
    };

    let mut cells: Vec<BTreeMap<String, String>> = vec![BTreeMap::new()];
    let mut dimensions: BTreeSet<&str> = BTreeSet::new();
    for (key, values) in matrix {
        if key == "include" || key == "exclude" {
            continue;
        }
        let Value::Sequence(values) = values else {
            return Err(invalid(format!("'{}' must be a list of values", key)));
        };
        dimensions.insert(key.as_str());
        cells = cells
            .into_iter()
            .flat_map(|cell| {
                values.iter().map(move |value| {
                    let mut cell = cell.clone();
                    cell.insert(key.clone(), yaml_to_string(value));
                    cell
                })
            })
            .collect();
    }
    if dimensions.is_empty() {
        cells.clear();
    }

    if let Some(exclude) = matrix.get("exclude") {
        for entry in matrix_entries(exclude).map_err(&invalid)? {
            cells.retain(|cell| !entry.iter().all(|(k, v)| cell.get(k) == Some(v)));
        }
    }

    if let Some(include) = matrix.get("include") {
        let base = cells.len();
        for entry in matrix_entries(include).map_err(&invalid)? {
            let mut merged = false;
            for cell in cells.iter_mut().take(base) {
                let compatible = entry
                    .iter()
                    .filter(|(k, _)| dimensions.contains(k.as_str()))
                    .all(|(k, v)| cell.get(k) == Some(v));
                if compatible {
                    for (k, v) in &entry {
                        cell.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                    merged = true;
                }
            }
            if !merged {
                cells.push(entry);
            }
        }
    }

    if cells.is_empty() {
        return Err(invalid("matrix produces no job runs".to_string()));
    }
    Ok(cells)
}

fn matrix_entries(value: &Value) -> Result<Vec<BTreeMap<String, String>>, String> {
    let Value::Sequence(entries) = value else {
        return Err("'include' and 'exclude' must be lists of mappings".to_string());
    };
    entries
        .iter()
        .map(|entry| match entry {
            Value::Mapping(map) => Ok(map
                .iter()
                .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), yaml_to_string(v))))
                .collect()),
            _ => Err("'include' and 'exclude' entries must be mappings".to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow(yaml: &str) -> Workflow {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn stage_ids(graph: &PlannedGraph) -> Vec<Vec<String>> {
        graph
            .stages
            .iter()
            .map(|stage| stage.runs.iter().map(|run| run.job_id.clone()).collect())
            .collect()
    }

    const PIPELINE: &str = r#"
on: push
jobs:
  setup:
    steps:
      - run: echo setup
  api-tests:
    needs: setup
    steps:
      - run: echo api
  e2e-tests:
    needs: [setup]
    steps:
      - run: echo e2e
  cleanup:
    needs: [api-tests, e2e-tests]
    steps:
      - run: echo cleanup
"#;

    #[test]
    fn test_parallel_levels() {
        let graph = plan(&[workflow(PIPELINE)], &Selection::All).unwrap();
        assert_eq!(
            stage_ids(&graph),
            vec![
                vec!["setup".to_string()],
                vec!["api-tests".to_string(), "e2e-tests".to_string()],
                vec!["cleanup".to_string()],
            ]
        );
    }

    #[test]
    fn test_job_selection_includes_needs() {
        let graph = plan(
            &[workflow(PIPELINE)],
            &Selection::Job("api-tests".to_string()),
        )
        .unwrap();
        assert_eq!(
            stage_ids(&graph),
            vec![vec!["setup".to_string()], vec!["api-tests".to_string()]]
        );
    }

    #[test]
    fn test_event_selection() {
        let workflows = [workflow(PIPELINE)];
        assert!(plan(&workflows, &Selection::Event("workflow_call".to_string()))
            .unwrap()
            .is_empty());
        assert!(!plan(&workflows, &Selection::Event("push".to_string()))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unknown_job() {
        let result = plan(&[workflow(PIPELINE)], &Selection::Job("deploy".to_string()));
        assert!(matches!(result, Err(PlanError::UnknownJob(name)) if name == "deploy"));
    }

    #[test]
    fn test_missing_dependency() {
        let wf = workflow(
            r#"
jobs:
  tests:
    needs: setup
    steps:
      - run: echo tests
"#,
        );
        assert!(matches!(
            plan(&[wf], &Selection::All),
            Err(PlanError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_cyclic_dependency() {
        let wf = workflow(
            r#"
jobs:
  a:
    needs: c
    steps: [{run: echo a}]
  b:
    needs: a
    steps: [{run: echo b}]
  c:
    needs: b
    steps: [{run: echo c}]
"#,
        );
        match plan(&[wf], &Selection::All) {
            Err(PlanError::CyclicDependency(jobs)) => assert_eq!(jobs, vec!["a", "b", "c"]),
            other => panic!("expected a cycle, got {:?}", other.map(|g| g.job_ids())),
        }
    }

    #[test]
    fn test_matrix_expansion() {
        let wf = workflow(
            r#"
jobs:
  build:
    strategy:
      matrix:
        os: [linux, macos]
        version: [1, 2]
        exclude:
          - os: macos
            version: 1
        include:
          - os: linux
            experimental: true
          - os: windows
            version: 2
    steps:
      - run: echo build
"#,
        );
        let cells = expand_matrix("build", &wf.jobs["build"]).unwrap();
        let rendered: Vec<String> = cells
            .iter()
            .map(|cell| {
                cell.iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect();
        assert_eq!(
            rendered,
            vec![
                "experimental=true,os=linux,version=1",
                "experimental=true,os=linux,version=2",
                "os=macos,version=2",
                "os=windows,version=2",
            ]
        );

        let graph = plan(&[wf], &Selection::All).unwrap();
        assert_eq!(graph.stages[0].runs.len(), 4);
        assert_eq!(graph.job_ids(), vec!["build"]);
    }

    #[test]
    fn test_invalid_matrix() {
        let wf = workflow(
            r#"
jobs:
  build:
    strategy:
      matrix:
        os: ${{ fromJson(needs.setup.outputs.os) }}
    steps:
      - run: echo build
"#,
        );
        assert!(matches!(
            expand_matrix("build", &wf.jobs["build"]),
            Err(PlanError::InvalidMatrix { .. })
        ));
    }

    #[test]
    fn test_levels_of_workflows_merge_by_index() {
        let first = workflow(PIPELINE);
        let second = workflow(
            r#"
jobs:
  lint:
    steps:
      - run: echo lint
"#,
        );
        let graph = plan(&[first, second], &Selection::All).unwrap();
        assert_eq!(
            stage_ids(&graph)[0],
            vec!["setup".to_string(), "lint".to_string()]
        );
    }
}
