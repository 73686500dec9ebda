//! Read-only assertion views over run records

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::logs;
use crate::engine::{Interpolate, RunRecord, RunResult, StepRecord};
use crate::error::{AssertionMismatch, EntityKind, HarnessError, InputMismatch};
use crate::github_env::input_env_key;
use crate::identity;
use crate::workflow::StepKind;

/// A job as reported after execution
#[derive(Clone, Copy)]
pub struct JobView<'a> {
    record: &'a RunRecord,
    interpolator: &'a dyn Interpolate,
}

impl<'a> JobView<'a> {
    pub(crate) fn new(record: &'a RunRecord, interpolator: &'a dyn Interpolate) -> Self {
        Self {
            record,
            interpolator,
        }
    }

    pub fn record(&self) -> &'a RunRecord {
        self.record
    }

    pub fn id(&self) -> &'a str {
        &self.record.job_id
    }

    /// Resolved run name
    pub fn name(&self) -> &'a str {
        &self.record.name
    }

    pub fn result(&self) -> RunResult {
        self.record.result
    }

    pub fn succeeded(&self) -> bool {
        self.result() == RunResult::Success
    }

    pub fn failed(&self) -> bool {
        self.result() == RunResult::Failure
    }

    pub fn skipped(&self) -> bool {
        self.result() == RunResult::Skipped
    }

    pub fn outputs(&self) -> &'a HashMap<String, String> {
        &self.record.outputs
    }

    /// Values redacted from the logs
    pub fn masks(&self) -> &'a [String] {
        &self.record.masks
    }

    pub fn matrix(&self) -> &'a BTreeMap<String, String> {
        &self.record.matrix
    }

    pub fn summary(&self) -> &'a str {
        &self.record.summary
    }

    /// Transcript of the job, or of the jobs it called
    pub fn logs(&self) -> String {
        logs::job_transcript(self.record, self.interpolator)
    }

    /// Evaluated `with:` inputs of a reusable workflow call
    pub fn inputs(&self) -> &'a HashMap<String, String> {
        &self.record.with_evaluated
    }

    /// Jobs of the called workflow, in execution order
    pub fn children(&self) -> Vec<JobView<'a>> {
        self.record
            .children
            .iter()
            .flatten()
            .map(|child| JobView::new(child, self.interpolator))
            .collect()
    }

    /// Check the inputs a reusable workflow was called with
    ///
    /// Every missing or differing key is reported.
    pub fn was_called_with<K, V>(
        &self,
        expected: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), HarnessError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if !self.record.kind.is_reusable_workflow() {
            return Err(AssertionMismatch::NotReusableWorkflow {
                job: self.name().to_string(),
            }
            .into());
        }
        let mismatches = compare_inputs(expected, |key| {
            self.record.with_evaluated.get(key).map(String::as_str)
        });
        report(EntityKind::Job, self.name(), mismatches)
    }

    /// A step of this job, by identifier or declared name
    ///
    /// # Panics
    ///
    /// When the job calls a reusable workflow: such a job has no steps of its own.
    pub fn step(&self, name: &str) -> Result<StepView<'a>, HarnessError> {
        if self.record.kind.is_reusable_workflow() {
            panic!(
                "Job '{}' calls a reusable workflow and has no steps of its own; use children()",
                self.name()
            );
        }
        let record = identity::resolve(name, EntityKind::Step, &self.record.steps)?;
        Ok(StepView::new(record))
    }
}

impl PartialEq for JobView<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

impl fmt::Debug for JobView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobView")
            .field("job_id", &self.record.job_id)
            .field("name", &self.record.name)
            .field("result", &self.record.result)
            .finish()
    }
}

/// A step as reported after execution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepView<'a> {
    record: &'a StepRecord,
}

impl<'a> StepView<'a> {
    fn new(record: &'a StepRecord) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &'a StepRecord {
        self.record
    }

    pub fn id(&self) -> &'a str {
        &self.record.id
    }

    pub fn name(&self) -> &'a str {
        &self.record.name
    }

    pub fn result(&self) -> RunResult {
        self.record.result
    }

    pub fn succeeded(&self) -> bool {
        self.result() == RunResult::Success
    }

    pub fn failed(&self) -> bool {
        self.result() == RunResult::Failure
    }

    pub fn skipped(&self) -> bool {
        self.result() == RunResult::Skipped
    }

    /// Raw log text without surrounding whitespace
    pub fn logs(&self) -> &'a str {
        self.record.logs.trim()
    }

    pub fn outputs(&self) -> &'a HashMap<String, String> {
        &self.record.outputs
    }

    /// Check the `INPUT_*` environment an action step received
    ///
    /// Every missing or differing key is reported.
    pub fn assert_called_with<K, V>(
        &self,
        expected: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), HarnessError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if matches!(self.record.kind, StepKind::Run | StepKind::Invalid) {
            return Err(AssertionMismatch::NotActionStep {
                step: self.name().to_string(),
            }
            .into());
        }
        let mismatches = compare_inputs(expected, |key| {
            self.record
                .env_evaluated
                .get(&input_env_key(key))
                .map(String::as_str)
        });
        report(EntityKind::Step, self.name(), mismatches)
    }
}

fn compare_inputs<'v, K, V, F>(
    expected: impl IntoIterator<Item = (K, V)>,
    actual: F,
) -> Vec<InputMismatch>
where
    K: AsRef<str>,
    V: AsRef<str>,
    F: Fn(&str) -> Option<&'v str>,
{
    let mut expected: Vec<(K, V)> = expected.into_iter().collect();
    expected.sort_by(|(a, _), (b, _)| a.as_ref().cmp(b.as_ref()));

    expected
        .iter()
        .filter_map(|(key, value)| {
            let (key, value) = (key.as_ref(), value.as_ref());
            match actual(key) {
                None => Some(InputMismatch::Missing {
                    key: key.to_string(),
                }),
                Some(actual) if actual != value => Some(InputMismatch::Differs {
                    key: key.to_string(),
                    expected: value.to_string(),
                    actual: actual.to_string(),
                }),
                Some(_) => None,
            }
        })
        .collect()
}

fn report(kind: EntityKind, name: &str, mismatches: Vec<InputMismatch>) -> Result<(), HarnessError> {
    if mismatches.is_empty() {
        return Ok(());
    }
    Err(AssertionMismatch::Inputs {
        kind,
        name: name.to_string(),
        mismatches,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LocalEngine;
    use crate::workflow::JobKind;

    fn caller() -> RunRecord {
        let mut record = RunRecord::new("call", "Call workflow", RunResult::Success);
        record.kind = JobKind::ReusableWorkflowLocal;
        record.with_evaluated = HashMap::from([
            ("target".to_string(), "staging".to_string()),
            ("region".to_string(), "eu".to_string()),
        ]);
        record
    }

    fn action_step() -> StepRecord {
        let mut step = StepRecord::new("setup", "Setup node", RunResult::Success);
        step.kind = StepKind::UsesActionRemote;
        step.env_evaluated = HashMap::from([
            ("INPUT_NODE-VERSION".to_string(), "20".to_string()),
            ("INPUT_CACHE_DEPENDENCY_PATH".to_string(), "lock".to_string()),
        ]);
        step
    }

    #[test]
    fn test_was_called_with_reports_every_mismatch() {
        let record = caller();
        let view = JobView::new(&record, &LocalEngine);

        assert!(view
            .was_called_with([("target", "staging"), ("region", "eu")])
            .is_ok());

        let err = view
            .was_called_with([("target", "prod"), ("zone", "a"), ("region", "eu")])
            .unwrap_err();
        match err {
            HarnessError::Assertion(AssertionMismatch::Inputs { mismatches, .. }) => {
                assert_eq!(
                    mismatches,
                    vec![
                        InputMismatch::Differs {
                            key: "target".to_string(),
                            expected: "prod".to_string(),
                            actual: "staging".to_string(),
                        },
                        InputMismatch::Missing {
                            key: "zone".to_string()
                        },
                    ]
                );
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_was_called_with_on_plain_job_fails() {
        let record = RunRecord::new("build", "build", RunResult::Success);
        let view = JobView::new(&record, &LocalEngine);
        let err = view.was_called_with(Vec::<(&str, &str)>::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Job 'build' is not calling a reusable workflow"
        );
    }

    #[test]
    #[should_panic(expected = "calls a reusable workflow")]
    fn test_step_on_reusable_workflow_job_panics() {
        let record = caller();
        let view = JobView::new(&record, &LocalEngine);
        let _ = view.step("anything");
    }

    #[test]
    fn test_assert_called_with() {
        let mut record = RunRecord::new("build", "build", RunResult::Success);
        record.steps.push(action_step());
        let mut script = StepRecord::new("0", "Run a one-line script", RunResult::Success);
        script.logs = "  Hello, world!\n".to_string();
        record.steps.push(script);

        let view = JobView::new(&record, &LocalEngine);
        let step = view.step("Setup node").unwrap();
        assert!(step
            .assert_called_with([("node-version", "20"), ("cache-dependency-path", "x")])
            .is_err());
        assert!(step
            .assert_called_with([("node-version", "20"), ("cache dependency path", "lock")])
            .is_ok());

        let script = view.step("Run a one-line script").unwrap();
        assert_eq!(script.logs(), "Hello, world!");
        assert!(matches!(
            script.assert_called_with([("a", "b")]),
            Err(HarnessError::Assertion(AssertionMismatch::NotActionStep { .. }))
        ));
    }
}
