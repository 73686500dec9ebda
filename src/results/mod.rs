//! Result index
//!
//! Built once from the engine's run records after execution and never
//! mutated afterwards. Lookups go through [`JobView`] / [`StepView`].

pub mod logs;
mod view;

pub use crate::github_env::input_env_key;
pub use view::{JobView, StepView};

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::engine::{Interpolate, RunRecord};
use crate::error::{EntityKind, HarnessError};
use crate::identity::Addressable;

/// Position of a record: top level, or the n-th child of a top-level record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordRef {
    Top(usize),
    Child(usize, usize),
}

/// Immutable index over the records of one execution
pub struct Results {
    records: Vec<RunRecord>,
    /// Top-level records by id and resolved name; first match wins
    by_name: HashMap<String, usize>,
    /// Calling record of every child, by child id and resolved name
    child_parent: HashMap<String, usize>,
    /// Matrix cells by job id and declared name (children also by resolved name), in execution order
    families: HashMap<String, Vec<RecordRef>>,
    interpolator: Arc<dyn Interpolate>,
    execution_error: Option<anyhow::Error>,
}

impl Results {
    pub fn new(
        records: Vec<RunRecord>,
        interpolator: Arc<dyn Interpolate>,
        execution_error: Option<anyhow::Error>,
    ) -> Self {
        let mut by_name = HashMap::new();
        let mut child_parent = HashMap::new();
        let mut families: HashMap<String, Vec<RecordRef>> = HashMap::new();

        for (index, record) in records.iter().enumerate() {
            for name in record.identity().names() {
                by_name.entry(name.to_string()).or_insert(index);
            }
            for name in record.family_identity().names() {
                families
                    .entry(name.to_string())
                    .or_default()
                    .push(RecordRef::Top(index));
            }
        }

        for (parent, record) in records.iter().enumerate() {
            for (index, child) in record.children.iter().flatten().enumerate() {
                for name in child.identity().names() {
                    child_parent.entry(name.to_string()).or_insert(parent);
                }
                let names: BTreeSet<&str> = child
                    .family_identity()
                    .names()
                    .chain(child.identity().names())
                    .collect();
                for name in names {
                    families
                        .entry(name.to_string())
                        .or_default()
                        .push(RecordRef::Child(parent, index));
                }
            }
        }

        Self {
            records,
            by_name,
            child_parent,
            families,
            interpolator,
            execution_error,
        }
    }

    /// Look up a job by identifier or resolved name
    ///
    /// Top-level records are searched first. A name that only matches a job
    /// of a called workflow resolves to the calling job.
    pub fn job(&self, name: &str) -> Result<JobView<'_>, HarnessError> {
        self.by_name
            .get(name)
            .or_else(|| self.child_parent.get(name))
            .map(|&index| self.view(&self.records[index]))
            .ok_or_else(|| HarnessError::not_found(EntityKind::Job, name))
    }

    /// Every matrix cell of a job, by job identifier or declared name
    ///
    /// Cells of jobs inside called workflows are included, and also answer
    /// to their resolved run name.
    pub fn matrix_job(&self, name: &str) -> Result<Vec<JobView<'_>>, HarnessError> {
        let cells = self
            .families
            .get(name)
            .ok_or_else(|| HarnessError::not_found(EntityKind::MatrixJob, name))?;

        Ok(cells
            .iter()
            .filter_map(|cell| self.record(*cell))
            .map(|record| self.view(record))
            .collect())
    }

    /// Top-level jobs in execution order
    pub fn jobs(&self) -> impl Iterator<Item = JobView<'_>> {
        self.records.iter().map(|record| self.view(record))
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    /// Error the engine reported alongside the records, if any
    pub fn execution_error(&self) -> Option<&anyhow::Error> {
        self.execution_error.as_ref()
    }

    fn record(&self, at: RecordRef) -> Option<&RunRecord> {
        match at {
            RecordRef::Top(index) => self.records.get(index),
            RecordRef::Child(parent, index) => self
                .records
                .get(parent)
                .and_then(|record| record.children.as_ref())
                .and_then(|children| children.get(index)),
        }
    }

    fn view<'a>(&'a self, record: &'a RunRecord) -> JobView<'a> {
        JobView::new(record, self.interpolator.as_ref())
    }
}

impl fmt::Debug for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Results")
            .field("records", &self.records)
            .field("indexed_names", &self.by_name.len())
            .field("execution_error", &self.execution_error)
            .finish()
    }
}
