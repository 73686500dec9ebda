//! Expression evaluation for GitHub Actions-style ${{ }} syntax
//!
//! Supports:
//! - ${{ env.VAR_NAME }}, ${{ secrets.NAME }}, ${{ vars.NAME }}
//! - ${{ inputs.NAME }}, ${{ matrix.KEY }}
//! - ${{ steps.step_id.outputs.output_name }}, ${{ steps.step_id.outcome }}
//! - ${{ needs.job_id.outputs.output_name }}, ${{ needs.job_id.result }}
//! - ${{ jobs.job_id.outputs.output_name }}
//! - ${{ github.run_id }}, ${{ github.job }}, ${{ github.event_name }}, ${{ github.ref }}, ...
//!
//! References to values that are not set evaluate to the empty string.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

use super::context::ExecutionContext;
use super::job::yaml_to_string;

static EXPRESSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\{\s*([^}]+?)\s*\}\}").unwrap());

/// Errors that can occur during expression evaluation
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Invalid expression syntax: {0}")]
    InvalidSyntax(String),
}

/// Where a condition is evaluated; decides what the status functions look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionScope {
    /// Job `if:` - status functions look at the jobs in `needs`
    Job,
    /// Step `if:` - status functions look at the previous steps of the job
    Step,
}

/// Evaluate all expressions in a string
pub fn evaluate(input: &str, ctx: &ExecutionContext) -> Result<String, ExpressionError> {
    let mut result = String::with_capacity(input.len());
    let mut last = 0;

    for cap in EXPRESSION_REGEX.captures_iter(input) {
        let (Some(full), Some(expr)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        result.push_str(&input[last..full.start()]);
        result.push_str(&evaluate_operand(expr.as_str(), ctx, ConditionScope::Step)?);
        last = full.end();
    }
    result.push_str(&input[last..]);

    Ok(result)
}

/// Evaluate all expressions in a string, leaving it untouched when it does not evaluate
pub fn interpolate(input: &str, ctx: &ExecutionContext) -> String {
    match evaluate(input, ctx) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to interpolate '{}': {}", input, e);
            input.to_string()
        }
    }
}

/// Evaluate a single reference (without the ${{ }} wrapper)
fn evaluate_single(expr: &str, ctx: &ExecutionContext) -> Result<String, ExpressionError> {
    let parts: Vec<&str> = expr.split('.').collect();

    let lookup = |map: &HashMap<String, String>, name: &str| -> Result<String, ExpressionError> {
        if parts.len() != 2 {
            return Err(ExpressionError::InvalidSyntax(format!(
                "{} expressions must be {}.NAME, got: {}",
                name, name, expr
            )));
        }
        Ok(map.get(parts[1]).cloned().unwrap_or_default())
    };

    match parts[0] {
        "env" => lookup(&ctx.env, "env"),
        "secrets" => lookup(&ctx.secrets, "secrets"),
        "vars" => lookup(&ctx.vars, "vars"),
        "inputs" => lookup(&ctx.inputs, "inputs"),

        "matrix" => {
            if parts.len() != 2 {
                return Err(ExpressionError::InvalidSyntax(format!(
                    "matrix expressions must be matrix.KEY, got: {}",
                    expr
                )));
            }
            Ok(ctx.matrix.get(parts[1]).cloned().unwrap_or_default())
        }

        "steps" => match parts.as_slice() {
            [_, step_id, "outputs", key] => {
                Ok(ctx.get_output(step_id, key).cloned().unwrap_or_default())
            }
            [_, step_id, "outcome" | "conclusion"] => Ok(ctx
                .step_outcomes
                .get(*step_id)
                .map(|r| r.to_string())
                .unwrap_or_default()),
            _ => Err(ExpressionError::InvalidSyntax(format!(
                "steps expressions must be steps.STEP_ID.outputs.OUTPUT_NAME, got: {}",
                expr
            ))),
        },

        "needs" => match parts.as_slice() {
            [_, job_id, "outputs", key] => Ok(ctx
                .needs
                .get(*job_id)
                .and_then(|need| need.outputs.get(*key))
                .cloned()
                .unwrap_or_default()),
            [_, job_id, "result"] => Ok(ctx
                .needs
                .get(*job_id)
                .and_then(|need| need.result)
                .map(|r| r.to_string())
                .unwrap_or_default()),
            _ => Err(ExpressionError::InvalidSyntax(format!(
                "needs expressions must be needs.JOB_ID.outputs.OUTPUT_NAME or needs.JOB_ID.result, got: {}",
                expr
            ))),
        },

        "jobs" => match parts.as_slice() {
            [_, job_id, "outputs", key] => {
                Ok(ctx.get_job_output(job_id, key).cloned().unwrap_or_default())
            }
            _ => Err(ExpressionError::InvalidSyntax(format!(
                "jobs expressions must be jobs.JOB_NAME.outputs.OUTPUT_NAME, got: {}",
                expr
            ))),
        },

        "github" => match parts.get(1).copied() {
            Some("run_id") => Ok(ctx.run_id.clone()),
            Some("job") => Ok(ctx.current_job.clone().unwrap_or_default()),
            Some("event_name") => Ok(ctx.event_name.clone()),
            Some(field) => Ok(ctx
                .env
                .get(&format!("GITHUB_{}", field.to_uppercase()))
                .cloned()
                .unwrap_or_default()),
            None => Err(ExpressionError::InvalidSyntax(expr.to_string())),
        },

        _ => Err(ExpressionError::UnknownVariable(expr.to_string())),
    }
}

/// Evaluate one operand of a condition: literal, status function, negation or reference
fn evaluate_operand(
    operand: &str,
    ctx: &ExecutionContext,
    scope: ConditionScope,
) -> Result<String, ExpressionError> {
    let operand = strip_parens(operand.trim());

    if let Some(inner) = operand.strip_prefix('!') {
        if !inner.starts_with('=') {
            return Ok((!is_truthy(&evaluate_operand(inner, ctx, scope)?)).to_string());
        }
    }

    if operand.contains("${{") {
        return evaluate(operand, ctx);
    }

    if operand.len() >= 2
        && ((operand.starts_with('\'') && operand.ends_with('\''))
            || (operand.starts_with('"') && operand.ends_with('"')))
    {
        return Ok(operand[1..operand.len() - 1].to_string());
    }

    if operand == "true" || operand == "false" || operand.parse::<f64>().is_ok() {
        return Ok(operand.to_string());
    }

    if let Some(status) = status_function(operand, ctx, scope) {
        return Ok(status.to_string());
    }

    evaluate_single(operand, ctx)
}

fn status_function(name: &str, ctx: &ExecutionContext, scope: ConditionScope) -> Option<bool> {
    let status = match (name, scope) {
        ("always()", _) => true,
        ("cancelled()", _) => false,
        ("success()", ConditionScope::Job) => ctx.needs_succeeded(),
        ("failure()", ConditionScope::Job) => ctx.needs_failed(),
        ("success()", ConditionScope::Step) => !ctx.job_failed,
        ("failure()", ConditionScope::Step) => ctx.job_failed,
        _ => return None,
    };
    Some(status)
}

fn strip_parens(s: &str) -> &str {
    let mut s = s.trim();
    while s.starts_with('(') && s.ends_with(')') && balanced(&s[1..s.len() - 1]) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn evaluate_boolean(
    condition: &str,
    ctx: &ExecutionContext,
    scope: ConditionScope,
) -> Result<bool, ExpressionError> {
    let condition = strip_parens(condition);

    if condition.contains("||") {
        for part in condition.split("||") {
            if evaluate_boolean(part, ctx, scope)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    if condition.contains("&&") {
        for part in condition.split("&&") {
            if !evaluate_boolean(part, ctx, scope)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }

    if let Some((left, right)) = condition.split_once("!=") {
        let left = evaluate_operand(left, ctx, scope)?;
        let right = evaluate_operand(right, ctx, scope)?;
        return Ok(left != right);
    }

    if let Some((left, right)) = condition.split_once("==") {
        let left = evaluate_operand(left, ctx, scope)?;
        let right = evaluate_operand(right, ctx, scope)?;
        return Ok(left == right);
    }

    Ok(is_truthy(&evaluate_operand(condition, ctx, scope)?))
}

fn mentions_status_function(condition: &str) -> bool {
    ["success()", "failure()", "always()", "cancelled()"]
        .iter()
        .any(|f| condition.contains(f))
}

/// Check if a condition expression evaluates to true
///
/// A condition without a status function is implicitly `success() && (condition)`.
pub fn evaluate_condition(
    condition: &str,
    ctx: &ExecutionContext,
    scope: ConditionScope,
) -> Result<bool, ExpressionError> {
    let mut condition = condition.trim();
    if condition.is_empty() {
        condition = "success()";
    }
    if let Some(inner) = condition
        .strip_prefix("${{")
        .and_then(|c| c.strip_suffix("}}"))
    {
        if !inner.contains("${{") {
            condition = inner.trim();
        }
    }

    if !mentions_status_function(condition)
        && !status_function("success()", ctx, scope).unwrap_or(true)
    {
        return Ok(false);
    }

    evaluate_boolean(condition, ctx, scope)
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty()
        && value != "false"
        && value != "0"
        && value.to_lowercase() != "null"
}

/// Evaluate all expressions in a HashMap of parameters
pub fn evaluate_params(
    params: &HashMap<String, serde_yaml::Value>,
    ctx: &ExecutionContext,
) -> Result<HashMap<String, String>, ExpressionError> {
    let mut result = HashMap::new();

    for (key, value) in params {
        let string_value = match value {
            serde_yaml::Value::String(s) => evaluate(s, ctx)?,
            other => yaml_to_string(other),
        };
        result.insert(key.clone(), string_value);
    }

    Ok(result)
}
