//! Script steps
//!
//! Runs a `run:` script through `sh -e -c` on the host and collects what the
//! script reported back through the GitHub file commands and workflow commands:
//!
//! ```sh
//! echo "greeting=Hello" >> "$GITHUB_OUTPUT"
//! echo "TARGET=staging" >> "$GITHUB_ENV"
//! echo "### Done" >> "$GITHUB_STEP_SUMMARY"
//! echo "::add-mask::$TOKEN"
//! echo "::set-output name=legacy::value"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::engine::error::EngineError;

/// Host variables kept in the otherwise cleared script environment
const INHERITED_VARS: &[&str] = &["PATH", "HOME", "TMPDIR", "LANG"];

/// What a script produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellOutput {
    pub success: bool,
    pub exit_code: i32,
    /// Stdout without workflow command lines, then stderr
    pub logs: String,
    pub outputs: HashMap<String, String>,
    /// Variables exported through `GITHUB_ENV`
    pub env: HashMap<String, String>,
    pub masks: Vec<String>,
    pub summary: String,
}

/// A script ready to run
#[derive(Debug)]
pub struct Script<'a> {
    pub body: &'a str,
    pub env: &'a HashMap<String, String>,
    pub working_dir: &'a Path,
    /// Directory holding the file command files
    pub command_dir: &'a Path,
}

struct CommandFiles {
    output: PathBuf,
    env: PathBuf,
    summary: PathBuf,
}

impl CommandFiles {
    async fn create(dir: &Path) -> Result<Self, EngineError> {
        let id = uuid::Uuid::new_v4();
        let files = Self {
            output: dir.join(format!("output-{}", id)),
            env: dir.join(format!("env-{}", id)),
            summary: dir.join(format!("step-summary-{}", id)),
        };
        tokio::fs::create_dir_all(dir).await?;
        for path in [&files.output, &files.env, &files.summary] {
            tokio::fs::write(path, b"").await?;
        }
        Ok(files)
    }
}

/// Execute a script and collect its logs and file commands
pub async fn run_script(script: &Script<'_>) -> Result<ShellOutput, EngineError> {
    let files = CommandFiles::create(script.command_dir).await?;
    debug!("Executing script in {}", script.working_dir.display());

    let mut cmd = Command::new("sh");
    cmd.arg("-e").arg("-c").arg(script.body);
    cmd.current_dir(script.working_dir);
    cmd.env_clear();
    for var in INHERITED_VARS {
        if let Ok(value) = std::env::var(var) {
            cmd.env(var, value);
        }
    }
    cmd.envs(script.env);
    cmd.env("GITHUB_OUTPUT", &files.output);
    cmd.env("GITHUB_ENV", &files.env);
    cmd.env("GITHUB_STEP_SUMMARY", &files.summary);

    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let output = cmd.output().await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let mut result = ShellOutput {
        success: output.status.success(),
        exit_code: output.status.code().unwrap_or(-1),
        ..Default::default()
    };

    let mut logs = Vec::new();
    for line in stdout.lines() {
        if let Some(mask) = line.strip_prefix("::add-mask::") {
            if !mask.is_empty() {
                result.masks.push(mask.to_string());
            }
        } else if let Some((name, value)) = parse_set_output(line) {
            result.outputs.insert(name, value);
        } else {
            logs.push(line);
        }
    }
    logs.extend(stderr.lines());
    result.logs = logs.join("\n");

    result
        .outputs
        .extend(parse_file_command(&tokio::fs::read_to_string(&files.output).await?));
    result.env = parse_file_command(&tokio::fs::read_to_string(&files.env).await?);
    result.summary = tokio::fs::read_to_string(&files.summary).await?;

    debug!("Script exited with code {}", result.exit_code);
    Ok(result)
}

/// `::set-output name=<name>::<value>`
fn parse_set_output(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("::set-output ")?;
    let (params, value) = rest.split_once("::")?;
    let name = params
        .split(',')
        .find_map(|param| param.trim().strip_prefix("name="))?;
    Some((name.to_string(), value.to_string()))
}

/// Parse `KEY=value` lines and `KEY<<DELIMITER` heredocs
pub fn parse_file_command(content: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let equals = line.find('=');
        let heredoc = line.find("<<");
        match (equals, heredoc) {
            (eq, Some(start)) if eq.map_or(true, |eq| start < eq) => {
                let key = &line[..start];
                let delimiter = &line[start + 2..];
                let mut body = Vec::new();
                for line in lines.by_ref() {
                    if line == delimiter {
                        break;
                    }
                    body.push(line);
                }
                values.insert(key.to_string(), body.join("\n"));
            }
            (Some(eq), _) => {
                values.insert(line[..eq].to_string(), line[eq + 1..].to_string());
            }
            _ => {}
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn run(body: &str, env: &HashMap<String, String>) -> ShellOutput {
        let dir = tempdir().unwrap();
        let script = Script {
            body,
            env,
            working_dir: dir.path(),
            command_dir: &dir.path().join("commands"),
        };
        run_script(&script).await.unwrap()
    }

    #[test]
    fn test_parse_file_command() {
        let parsed = parse_file_command(
            "greeting=Hello\nequation=a=b\nnotes<<EOF\nline one\nline two\nEOF\nbroken\n",
        );
        assert_eq!(parsed["greeting"], "Hello");
        assert_eq!(parsed["equation"], "a=b");
        assert_eq!(parsed["notes"], "line one\nline two");
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn test_parse_set_output() {
        assert_eq!(
            parse_set_output("::set-output name=color::blue"),
            Some(("color".to_string(), "blue".to_string()))
        );
        assert_eq!(parse_set_output("echo ::set-output"), None);
    }

    #[tokio::test]
    async fn test_script_file_commands() {
        let env = HashMap::from([("NAME".to_string(), "world".to_string())]);
        let output = run(
            r####"echo "Hello, $NAME!"
echo "greeting=Hello" >> "$GITHUB_OUTPUT"
echo "TARGET=staging" >> "$GITHUB_ENV"
echo "### Done" >> "$GITHUB_STEP_SUMMARY"
echo "::add-mask::s3cret"
echo "::set-output name=legacy::yes""####,
            &env,
        )
        .await;

        assert!(output.success);
        assert_eq!(output.logs, "Hello, world!");
        assert_eq!(output.outputs["greeting"], "Hello");
        assert_eq!(output.outputs["legacy"], "yes");
        assert_eq!(output.env["TARGET"], "staging");
        assert_eq!(output.summary, "### Done\n");
        assert_eq!(output.masks, vec!["s3cret"]);
    }

    #[tokio::test]
    async fn test_failing_script_stops_at_first_error() {
        let output = run("echo before\nfalse\necho after", &HashMap::new()).await;
        assert!(!output.success);
        assert_eq!(output.exit_code, 1);
        assert_eq!(output.logs, "before");
    }

    #[tokio::test]
    async fn test_stderr_follows_stdout() {
        let output = run("echo out; echo err >&2", &HashMap::new()).await;
        assert_eq!(output.logs, "out\nerr");
    }
}
