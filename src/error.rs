//! Harness error types

use std::fmt;
use std::path::PathBuf;

/// Kind of entity a lookup was looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Job,
    Step,
    MatrixJob,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Job => write!(f, "Job"),
            EntityKind::Step => write!(f, "Step"),
            EntityKind::MatrixJob => write!(f, "Matrix job"),
        }
    }
}

/// One expected input that did not match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMismatch {
    Missing {
        key: String,
    },
    Differs {
        key: String,
        expected: String,
        actual: String,
    },
}

/// An assertion over a job or step that did not hold
///
/// Every mismatch is collected before this is reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssertionMismatch {
    #[error("Job '{job}' is not calling a reusable workflow")]
    NotReusableWorkflow { job: String },

    #[error("Step '{step}' is not calling an action or reusable workflow")]
    NotActionStep { step: String },

    #[error("{kind} '{name}' did not receive expected inputs:\n{}", render_mismatches(*kind, name, mismatches))]
    Inputs {
        kind: EntityKind,
        name: String,
        mismatches: Vec<InputMismatch>,
    },
}

fn render_mismatches(kind: EntityKind, name: &str, mismatches: &[InputMismatch]) -> String {
    let scope = match kind {
        EntityKind::Step => "step",
        _ => "job",
    };
    mismatches
        .iter()
        .map(|mismatch| match mismatch {
            InputMismatch::Missing { key } => {
                format!("Input '{}' not found in {} '{}'", key, scope, name)
            }
            InputMismatch::Differs {
                key,
                expected,
                actual,
            } => format!(
                "Input '{}' expected '{}' != actual '{}'",
                key, expected, actual
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors surfaced by the harness
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: EntityKind, name: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cannot read '{}' for injection into the job container: {source}", path.display())]
    InjectedFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Planning failed: {0:#}")]
    Planning(anyhow::Error),

    #[error("Execution failed: {0:#}")]
    Execution(anyhow::Error),

    #[error(transparent)]
    Assertion(#[from] AssertionMismatch),
}

impl HarnessError {
    pub(crate) fn not_found(kind: EntityKind, name: &str) -> Self {
        HarnessError::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = HarnessError::not_found(EntityKind::Step, "Clean up");
        assert_eq!(err.to_string(), "Step 'Clean up' not found");
    }

    #[test]
    fn test_input_mismatch_report_lists_every_key() {
        let err = AssertionMismatch::Inputs {
            kind: EntityKind::Job,
            name: "call".to_string(),
            mismatches: vec![
                InputMismatch::Differs {
                    key: "target".to_string(),
                    expected: "prod".to_string(),
                    actual: "staging".to_string(),
                },
                InputMismatch::Missing {
                    key: "region".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "Job 'call' did not receive expected inputs:\n\
             Input 'target' expected 'prod' != actual 'staging'\n\
             Input 'region' not found in job 'call'"
        );
    }
}
