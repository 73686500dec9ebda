//! Harness configuration
//!
//! A [`HarnessConfig`] is built once, through [`HarnessConfig::builder`] or
//! from a YAML file, and is immutable afterwards. Every option starts from
//! the [`defaults`] table:
//!
//! ```yaml
//! workflow_path: .github/workflows/example.yaml
//! event: workflow_dispatch
//! inputs:
//!   target: staging
//! env:
//!   GITHUB_REF: refs/heads/feature
//! secrets:
//!   API_KEY: hunter2
//! platforms:
//!   ubuntu-latest: node:20-bookworm-slim
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::engine::Selection;
use crate::error::HarnessError;
use crate::github_env::GithubEnv;

/// Canonical default values of every option
pub mod defaults {
    pub const WORKFLOW_PATH: &str = "./.github/workflows/";
    pub const WORKDIR: &str = ".";
    pub const DEFAULT_BRANCH: &str = "main";
    pub const EVENT_NAME: &str = "push";
    pub const ACTOR: &str = "nektos/act";
    pub const REPOSITORY: &str = "local/repository";
    pub const GITHUB_INSTANCE: &str = "github.com";
    pub const LOG_OUTPUT: bool = true;
    /// Environment variable the token is read from when none is configured
    pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";
    /// Runner label to container image
    pub const PLATFORMS: &[(&str, &str)] = &[
        ("ubuntu-latest", "node:16-buster-slim"),
        ("ubuntu-24.04", "node:16-bullseye-slim"),
        ("ubuntu-22.04", "node:16-bullseye-slim"),
        ("ubuntu-20.04", "node:16-buster-slim"),
        ("ubuntu-18.04", "node:16-buster-slim"),
    ];
}

/// Validated, immutable harness configuration
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    workflow_path: PathBuf,
    job: Option<String>,
    event: Option<String>,
    inputs: HashMap<String, String>,
    env: HashMap<String, String>,
    secrets: HashMap<String, String>,
    vars: HashMap<String, String>,
    platforms: BTreeMap<String, String>,
    workdir: PathBuf,
    default_branch: String,
    actor: String,
    repository: String,
    github_instance: String,
    token: Option<String>,
    log_output: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            workflow_path: PathBuf::from(defaults::WORKFLOW_PATH),
            job: None,
            event: None,
            inputs: HashMap::new(),
            env: HashMap::new(),
            secrets: HashMap::new(),
            vars: HashMap::new(),
            platforms: defaults::PLATFORMS
                .iter()
                .map(|(label, image)| (label.to_string(), image.to_string()))
                .collect(),
            workdir: PathBuf::from(defaults::WORKDIR),
            default_branch: defaults::DEFAULT_BRANCH.to_string(),
            actor: defaults::ACTOR.to_string(),
            repository: defaults::REPOSITORY.to_string(),
            github_instance: defaults::GITHUB_INSTANCE.to_string(),
            token: None,
            log_output: defaults::LOG_OUTPUT,
        }
    }
}

impl HarnessConfig {
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::default()
    }

    /// Load a configuration file; keys mirror the builder options
    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let file: ConfigFile = serde_yaml::from_str(&content).map_err(|e| {
            HarnessError::Configuration(format!("invalid {}: {}", path.display(), e))
        })?;
        file.into_builder().build()
    }

    pub fn workflow_path(&self) -> &Path {
        &self.workflow_path
    }

    /// Which jobs to plan: a job name beats an event name, which beats all jobs
    pub fn selection(&self) -> Selection {
        match (&self.job, &self.event) {
            (Some(job), _) => Selection::Job(job.clone()),
            (None, Some(event)) => Selection::Event(event.clone()),
            (None, None) => Selection::All,
        }
    }

    /// Name of the triggering event
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or(defaults::EVENT_NAME)
    }

    pub fn inputs(&self) -> &HashMap<String, String> {
        &self.inputs
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn secrets(&self) -> &HashMap<String, String> {
        &self.secrets
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    pub fn platforms(&self) -> &BTreeMap<String, String> {
        &self.platforms
    }

    /// Container image for the first runner label with a configured platform
    pub fn platform_image<'a>(&self, labels: impl IntoIterator<Item = &'a String>) -> Option<&str> {
        labels
            .into_iter()
            .find_map(|label| self.platforms.get(label))
            .map(String::as_str)
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn github_instance(&self) -> &str {
        &self.github_instance
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn log_output(&self) -> bool {
        self.log_output
    }
}

/// Builder for [`HarnessConfig`]
#[derive(Debug, Clone, Default)]
pub struct HarnessConfigBuilder {
    config: HarnessConfig,
    token: Option<String>,
}

impl HarnessConfigBuilder {
    /// `workflow_path`: workflow file, or directory of workflow files, to plan
    pub fn workflow_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.workflow_path = path.into();
        self
    }

    /// `job`: plan only this job and the jobs it needs
    pub fn job(mut self, name: impl Into<String>) -> Self {
        self.config.job = Some(name.into());
        self
    }

    /// `event`: plan the workflows triggered by this event, and report it as `github.event_name`
    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.config.event = Some(name.into());
        self
    }

    /// `inputs`: workflow inputs; merged key by key over earlier calls
    pub fn inputs<K, V>(mut self, inputs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config
            .inputs
            .extend(inputs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// `env`: environment of every job, over the runner defaults
    pub fn env<K, V>(mut self, env: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config
            .env
            .extend(env.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// `env`: override one default runner variable
    pub fn github_env(mut self, var: GithubEnv, value: impl Into<String>) -> Self {
        self.config.env.insert(var.as_str().to_string(), value.into());
        self
    }

    /// `secrets`: values exposed as `secrets.*` and masked in logs
    pub fn secrets<K, V>(mut self, secrets: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config
            .secrets
            .extend(secrets.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// `vars`: values exposed as `vars.*`
    pub fn vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config
            .vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// `platforms`: container image used for jobs running on `label`
    pub fn platform(mut self, label: impl Into<String>, image: impl Into<String>) -> Self {
        self.config.platforms.insert(label.into(), image.into());
        self
    }

    /// `workdir`: repository root; scripts run here and local reusable workflows resolve from here
    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.config.workdir = workdir.into();
        self
    }

    /// `default_branch`: branch reported in `GITHUB_REF` / `GITHUB_REF_NAME`
    pub fn default_branch(mut self, branch: impl Into<String>) -> Self {
        self.config.default_branch = branch.into();
        self
    }

    /// `actor`: user reported as `GITHUB_ACTOR`
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.config.actor = actor.into();
        self
    }

    /// `repository`: `owner/name` reported as `GITHUB_REPOSITORY`
    pub fn repository(mut self, repository: impl Into<String>) -> Self {
        self.config.repository = repository.into();
        self
    }

    /// `github_instance`: host used for `GITHUB_SERVER_URL` and friends
    pub fn github_instance(mut self, instance: impl Into<String>) -> Self {
        self.config.github_instance = instance.into();
        self
    }

    /// `token`: exposed as `secrets.GITHUB_TOKEN`; read from `GITHUB_TOKEN` when unset
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// `log_output`: echo captured step logs through `tracing`
    pub fn log_output(mut self, enabled: bool) -> Self {
        self.config.log_output = enabled;
        self
    }

    pub fn build(self) -> Result<HarnessConfig, HarnessError> {
        let mut config = self.config;

        if config.workflow_path.as_os_str().is_empty() {
            return Err(HarnessError::Configuration(
                "workflow_path must not be empty".to_string(),
            ));
        }
        if config.job.as_deref() == Some("") {
            return Err(HarnessError::Configuration(
                "job name must not be empty".to_string(),
            ));
        }
        if config.event.as_deref() == Some("") {
            return Err(HarnessError::Configuration(
                "event name must not be empty".to_string(),
            ));
        }
        if let Some((label, image)) = config
            .platforms
            .iter()
            .find(|(label, image)| label.is_empty() || image.is_empty())
        {
            return Err(HarnessError::Configuration(format!(
                "platform '{}' -> '{}' needs both a label and an image",
                label, image
            )));
        }

        config.token = self
            .token
            .or_else(|| std::env::var(defaults::TOKEN_ENV_VAR).ok())
            .filter(|token| !token.is_empty());

        Ok(config)
    }
}

/// On-disk form of the configuration
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    workflow_path: Option<PathBuf>,
    job: Option<String>,
    event: Option<String>,
    inputs: HashMap<String, String>,
    env: HashMap<String, String>,
    secrets: HashMap<String, String>,
    vars: HashMap<String, String>,
    platforms: BTreeMap<String, String>,
    workdir: Option<PathBuf>,
    default_branch: Option<String>,
    actor: Option<String>,
    repository: Option<String>,
    github_instance: Option<String>,
    token: Option<String>,
    log_output: Option<bool>,
}

impl ConfigFile {
    fn into_builder(self) -> HarnessConfigBuilder {
        let mut builder = HarnessConfig::builder()
            .inputs(self.inputs)
            .env(self.env)
            .secrets(self.secrets)
            .vars(self.vars);

        for (label, image) in self.platforms {
            builder = builder.platform(label, image);
        }
        if let Some(path) = self.workflow_path {
            builder = builder.workflow_path(path);
        }
        if let Some(job) = self.job {
            builder = builder.job(job);
        }
        if let Some(event) = self.event {
            builder = builder.event(event);
        }
        if let Some(workdir) = self.workdir {
            builder = builder.workdir(workdir);
        }
        if let Some(branch) = self.default_branch {
            builder = builder.default_branch(branch);
        }
        if let Some(actor) = self.actor {
            builder = builder.actor(actor);
        }
        if let Some(repository) = self.repository {
            builder = builder.repository(repository);
        }
        if let Some(instance) = self.github_instance {
            builder = builder.github_instance(instance);
        }
        if let Some(token) = self.token {
            builder = builder.token(token);
        }
        if let Some(log_output) = self.log_output {
            builder = builder.log_output(log_output);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::builder().build().unwrap();
        assert_eq!(config.workflow_path(), Path::new("./.github/workflows/"));
        assert_eq!(config.selection(), Selection::All);
        assert_eq!(config.event_name(), "push");
        assert_eq!(config.default_branch(), "main");
        assert_eq!(
            config.platforms().get("ubuntu-latest").map(String::as_str),
            Some("node:16-buster-slim")
        );
        assert!(config.log_output());
    }

    #[test]
    fn test_selection_precedence() {
        let event_only = HarnessConfig::builder()
            .event("workflow_call")
            .build()
            .unwrap();
        assert_eq!(
            event_only.selection(),
            Selection::Event("workflow_call".to_string())
        );
        assert_eq!(event_only.event_name(), "workflow_call");

        let both = HarnessConfig::builder()
            .event("workflow_call")
            .job("main")
            .build()
            .unwrap();
        assert_eq!(both.selection(), Selection::Job("main".to_string()));
    }

    #[test]
    fn test_repeated_options_merge() {
        let config = HarnessConfig::builder()
            .inputs([("a", "1"), ("b", "2")])
            .inputs([("b", "3")])
            .github_env(GithubEnv::Ref, "refs/heads/test-branch")
            .platform("self-hosted", "debian:12")
            .build()
            .unwrap();

        assert_eq!(config.inputs()["a"], "1");
        assert_eq!(config.inputs()["b"], "3");
        assert_eq!(config.env()["GITHUB_REF"], "refs/heads/test-branch");
        let labels = vec!["missing".to_string(), "self-hosted".to_string()];
        assert_eq!(config.platform_image(&labels), Some("debian:12"));
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            HarnessConfig::builder().workflow_path("").build(),
            Err(HarnessError::Configuration(_))
        ));
        assert!(matches!(
            HarnessConfig::builder().job("").build(),
            Err(HarnessError::Configuration(_))
        ));
        assert!(matches!(
            HarnessConfig::builder().platform("ubuntu-latest", "").build(),
            Err(HarnessError::Configuration(_))
        ));
    }

    #[test]
    fn test_explicit_token_wins() {
        let config = HarnessConfig::builder().token("abc").build().unwrap();
        assert_eq!(config.token(), Some("abc"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("harness.yaml");
        fs::write(
            &path,
            r#"
workflow_path: ci/example.yaml
event: workflow_dispatch
inputs:
  target: staging
secrets:
  API_KEY: hunter2
platforms:
  ubuntu-latest: node:20-bookworm-slim
log_output: false
"#,
        )
        .unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.workflow_path(), Path::new("ci/example.yaml"));
        assert_eq!(
            config.selection(),
            Selection::Event("workflow_dispatch".to_string())
        );
        assert_eq!(config.inputs()["target"], "staging");
        assert_eq!(config.secrets()["API_KEY"], "hunter2");
        assert_eq!(
            config.platforms()["ubuntu-latest"],
            "node:20-bookworm-slim"
        );
        assert!(!config.log_output());
    }

    #[test]
    fn test_from_file_rejects_unknown_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("harness.yaml");
        fs::write(&path, "workflow_pth: typo.yaml\n").unwrap();
        assert!(matches!(
            HarnessConfig::from_file(&path),
            Err(HarnessError::Configuration(_))
        ));
    }
}
