//! Workflow, Job, and Step definitions
//!
//! This module contains the workflow definition types, shaped after the
//! GitHub Actions workflow syntax.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// Workflow
// ============================================================================

/// A complete workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow name
    #[serde(default)]
    pub name: Option<String>,

    /// Events that trigger this workflow
    #[serde(default)]
    pub on: Triggers,

    /// Environment variables available to all jobs
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Jobs keyed by job identifier
    #[serde(default)]
    pub jobs: BTreeMap<String, Job>,
}

/// Declared input of a `workflow_call` / `workflow_dispatch` trigger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
}

/// Trigger specification for a workflow
#[derive(Debug, Clone, Default, Serialize)]
pub struct Triggers {
    /// Event names, in declaration order
    pub events: Vec<String>,
    /// Inputs declared under `workflow_call` or `workflow_dispatch`
    pub inputs: BTreeMap<String, InputSpec>,
}

impl<'de> Deserialize<'de> for Triggers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum TriggersHelper {
            Single(String),
            List(Vec<String>),
            Map(serde_yaml::Mapping),
        }

        match TriggersHelper::deserialize(deserializer)? {
            TriggersHelper::Single(event) => Ok(Triggers {
                events: vec![event],
                inputs: BTreeMap::new(),
            }),
            TriggersHelper::List(events) => Ok(Triggers {
                events,
                inputs: BTreeMap::new(),
            }),
            TriggersHelper::Map(map) => {
                let mut triggers = Triggers::default();
                for (key, config) in map {
                    let Some(event) = key.as_str() else {
                        continue;
                    };
                    if event == "workflow_call" || event == "workflow_dispatch" {
                        if let Some(inputs) = config.get("inputs") {
                            let inputs: BTreeMap<String, InputSpec> =
                                serde_yaml::from_value(inputs.clone())
                                    .map_err(serde::de::Error::custom)?;
                            triggers.inputs.extend(inputs);
                        }
                    }
                    triggers.events.push(event.to_string());
                }
                Ok(triggers)
            }
        }
    }
}

impl Triggers {
    /// Whether the workflow reacts to `event`
    pub fn has_event(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }

    /// Default values of the declared inputs, rendered as strings
    pub fn input_defaults(&self) -> HashMap<String, String> {
        self.inputs
            .iter()
            .filter_map(|(name, spec)| {
                spec.default
                    .as_ref()
                    .map(|value| (name.clone(), yaml_to_string(value)))
            })
            .collect()
    }
}

impl Workflow {
    /// Display name, falling back to the file-independent "workflow"
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }
}

// ============================================================================
// Job
// ============================================================================

/// Kind of a job, derived from its `uses` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// A job with its own steps
    Default,
    /// A job calling a reusable workflow from the same repository (`./path.yml`)
    ReusableWorkflowLocal,
    /// A job calling a reusable workflow from another repository (`owner/repo/path@ref`)
    ReusableWorkflowRemote,
}

impl JobKind {
    pub fn is_reusable_workflow(self) -> bool {
        !matches!(self, JobKind::Default)
    }
}

/// Container configuration of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Container {
    Image(String),
    Spec {
        image: String,
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

impl Container {
    pub fn image(&self) -> &str {
        match self {
            Container::Image(image) => image,
            Container::Spec { image, .. } => image,
        }
    }
}

/// Matrix strategy of a job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Strategy {
    /// Matrix dimensions plus the special `include` / `exclude` keys
    #[serde(default)]
    pub matrix: Option<BTreeMap<String, serde_yaml::Value>>,

    #[serde(default)]
    pub fail_fast: Option<bool>,
}

/// A job contains multiple steps, or calls a reusable workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Job {
    /// Human-readable name (may contain expressions)
    pub name: Option<String>,

    /// Jobs this job depends on
    #[serde(default, deserialize_with = "one_or_many")]
    pub needs: Vec<String>,

    /// Condition to run this job
    #[serde(rename = "if")]
    pub condition: Option<String>,

    /// Runner labels
    #[serde(default, deserialize_with = "one_or_many")]
    pub runs_on: Vec<String>,

    /// Job container
    pub container: Option<Container>,

    /// Job-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Output expressions, evaluated once the steps completed
    #[serde(default)]
    pub outputs: HashMap<String, String>,

    /// Matrix strategy
    pub strategy: Option<Strategy>,

    /// Steps to execute
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Reusable workflow reference
    pub uses: Option<String>,

    /// Inputs passed to the reusable workflow
    #[serde(default)]
    pub with: HashMap<String, serde_yaml::Value>,

    /// Continue the workflow even if this job fails
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self.uses.as_deref() {
            None => JobKind::Default,
            Some(uses) if uses.starts_with("./") || uses.starts_with("../") => {
                JobKind::ReusableWorkflowLocal
            }
            Some(_) => JobKind::ReusableWorkflowRemote,
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(OneOrMany::One(value)) => Ok(vec![value]),
        Some(OneOrMany::Many(values)) => Ok(values),
    }
}

// ============================================================================
// Step
// ============================================================================

/// Kind of a step, derived from its `run` / `uses` fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Inline script step
    Run,
    /// Action from the same repository (`./path`)
    UsesActionLocal,
    /// Action from another repository (`owner/repo@ref`)
    UsesActionRemote,
    /// Docker image action (`docker://image`)
    UsesDockerUrl,
    /// Neither or both of `run` / `uses`
    Invalid,
}

/// A single step in a job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Step {
    /// ID for referencing outputs
    pub id: Option<String>,

    /// Step name (may contain expressions)
    pub name: Option<String>,

    /// Inline script
    pub run: Option<String>,

    /// Action reference
    pub uses: Option<String>,

    /// Action inputs
    #[serde(default)]
    pub with: HashMap<String, serde_yaml::Value>,

    /// Step-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Condition to run this step
    #[serde(rename = "if")]
    pub condition: Option<String>,

    /// Continue the job if this step fails
    #[serde(default)]
    pub continue_on_error: bool,

    /// Working directory for `run` steps, relative to the workdir
    pub working_directory: Option<String>,
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match (&self.run, &self.uses) {
            (Some(_), None) => StepKind::Run,
            (None, Some(uses)) if uses.starts_with("docker://") => StepKind::UsesDockerUrl,
            (None, Some(uses)) if uses.starts_with("./") => StepKind::UsesActionLocal,
            (None, Some(_)) => StepKind::UsesActionRemote,
            _ => StepKind::Invalid,
        }
    }

    /// Name shown in logs: the declared name, else the action or script
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(uses) = &self.uses {
            return uses.clone();
        }
        self.run
            .as_deref()
            .and_then(|run| run.lines().map(str::trim).find(|l| !l.is_empty()))
            .map(|line| format!("Run {}", line))
            .unwrap_or_else(|| self.id.clone().unwrap_or_default())
    }
}

/// Render a scalar YAML value the way it appears in an expression context
pub fn yaml_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_deserialize() {
        let yaml = r#"
name: example
on: push
jobs:
  main:
    runs-on: ubuntu-latest
    outputs:
      greeting: ${{ steps.output.outputs.greeting }}
    steps:
      - name: Run a one-line script
        run: echo Hello, world!
      - id: output
        run: echo "greeting=Hello" >> "$GITHUB_OUTPUT"
  cleanup:
    needs: main
    if: always()
    steps:
      - name: Clean up
        run: echo done
"#;

        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(workflow.display_name(), "example");
        assert!(workflow.on.has_event("push"));
        assert_eq!(workflow.jobs["main"].runs_on, vec!["ubuntu-latest"]);
        assert_eq!(workflow.jobs["main"].steps.len(), 2);
        assert_eq!(workflow.jobs["cleanup"].needs, vec!["main"]);
        assert_eq!(
            workflow.jobs["cleanup"].condition.as_deref(),
            Some("always()")
        );
    }

    #[test]
    fn test_triggers_forms() {
        let single: Workflow = serde_yaml::from_str("on: push\njobs: {}").unwrap();
        assert_eq!(single.on.events, vec!["push"]);

        let list: Workflow = serde_yaml::from_str("on: [push, pull_request]\njobs: {}").unwrap();
        assert!(list.on.has_event("pull_request"));

        let yaml = r#"
on:
  push:
    branches: [main]
  workflow_call:
    inputs:
      target:
        type: string
        default: staging
      dry_run:
        type: boolean
        default: true
      name:
        required: true
jobs: {}
"#;
        let mapped: Workflow = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(mapped.on.events, vec!["push", "workflow_call"]);
        let defaults = mapped.on.input_defaults();
        assert_eq!(defaults.get("target"), Some(&"staging".to_string()));
        assert_eq!(defaults.get("dry_run"), Some(&"true".to_string()));
        assert!(!defaults.contains_key("name"));
        assert!(mapped.on.inputs["name"].required);
    }

    #[test]
    fn test_job_kinds() {
        let yaml = r#"
jobs:
  plain:
    steps:
      - run: echo hi
  local:
    uses: ./.github/workflows/called.yaml
    with:
      target: prod
  remote:
    uses: octo/repo/.github/workflows/called.yaml@v1
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(workflow.jobs["plain"].kind(), JobKind::Default);
        assert_eq!(
            workflow.jobs["local"].kind(),
            JobKind::ReusableWorkflowLocal
        );
        assert_eq!(
            workflow.jobs["remote"].kind(),
            JobKind::ReusableWorkflowRemote
        );
        assert!(workflow.jobs["local"].kind().is_reusable_workflow());
    }

    #[test]
    fn test_step_kinds_and_names() {
        let yaml = r#"
jobs:
  test:
    steps:
      - run: |

          echo first
          echo second
      - uses: actions/checkout@v4
      - uses: ./actions/local
      - uses: docker://alpine:3
      - name: Named
        run: echo named
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        let steps = &workflow.jobs["test"].steps;
        assert_eq!(steps[0].kind(), StepKind::Run);
        assert_eq!(steps[0].display_name(), "Run echo first");
        assert_eq!(steps[1].kind(), StepKind::UsesActionRemote);
        assert_eq!(steps[1].display_name(), "actions/checkout@v4");
        assert_eq!(steps[2].kind(), StepKind::UsesActionLocal);
        assert_eq!(steps[3].kind(), StepKind::UsesDockerUrl);
        assert_eq!(steps[4].display_name(), "Named");
    }

    #[test]
    fn test_container_forms() {
        let yaml = r#"
jobs:
  a:
    container: alpine:3
    steps: []
  b:
    container:
      image: node:20
    steps: []
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(workflow.jobs["a"].container.as_ref().unwrap().image(), "alpine:3");
        assert_eq!(workflow.jobs["b"].container.as_ref().unwrap().image(), "node:20");
    }
}
