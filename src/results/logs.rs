//! Log aggregation
//!
//! One transcript per job. Each non-blank line is prefixed with the name of
//! the step that logged it; jobs that called a reusable workflow are
//! flattened child by child, each child block prefixed with the child's name.

use crate::engine::{Interpolate, RunRecord};

/// Ordered transcript of a job and of the jobs it called
pub fn job_transcript(record: &RunRecord, interpolator: &dyn Interpolate) -> String {
    match &record.children {
        Some(children) if !children.is_empty() => children
            .iter()
            .map(|child| prefix_lines(&child.name, &job_transcript(child, interpolator)))
            .filter(|block| !block.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        _ => step_transcript(record, interpolator),
    }
}

/// Step logs of a job in step order, prefixed with the interpolated step names
pub fn step_transcript(record: &RunRecord, interpolator: &dyn Interpolate) -> String {
    record
        .steps
        .iter()
        .filter(|step| !step.logs.is_empty())
        .map(|step| {
            let name = interpolator.interpolate(&step.name, &record.context);
            prefix_lines(&name, &step.logs)
        })
        .filter(|block| !block.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefix every non-blank line with `"<name>: "`; blank lines are dropped
pub fn prefix_lines(name: &str, text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("{}: {}", name, line))
        .collect::<Vec<_>>()
        .join("\n")
}
