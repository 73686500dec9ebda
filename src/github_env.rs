//! Default runner environment variables that a harness may override

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use crate::config::HarnessConfig;

static INPUT_KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Z0-9-]").unwrap());

/// `INPUT_<KEY>` with the key uppercased and anything but `A-Z0-9-` replaced by `_`
///
/// The variable an action reads its `with:` input from.
pub fn input_env_key(key: &str) -> String {
    format!(
        "INPUT_{}",
        INPUT_KEY_REGEX.replace_all(&key.to_uppercase(), "_")
    )
}

/// A `GITHUB_*` / `RUNNER_*` variable the Engine sets for every job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GithubEnv {
    RunAttempt,
    RunId,
    RunNumber,
    RepositoryOwner,
    RetentionDays,
    RunnerPerflog,
    RunnerTrackingId,
    Repository,
    Ref,
    ShaRef,
    RefName,
    RefType,
    BaseRef,
    HeadRef,
    Workspace,
    ServerUrl,
    ApiUrl,
    GraphqlUrl,
}

impl GithubEnv {
    pub const ALL: [GithubEnv; 18] = [
        GithubEnv::RunAttempt,
        GithubEnv::RunId,
        GithubEnv::RunNumber,
        GithubEnv::RepositoryOwner,
        GithubEnv::RetentionDays,
        GithubEnv::RunnerPerflog,
        GithubEnv::RunnerTrackingId,
        GithubEnv::Repository,
        GithubEnv::Ref,
        GithubEnv::ShaRef,
        GithubEnv::RefName,
        GithubEnv::RefType,
        GithubEnv::BaseRef,
        GithubEnv::HeadRef,
        GithubEnv::Workspace,
        GithubEnv::ServerUrl,
        GithubEnv::ApiUrl,
        GithubEnv::GraphqlUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GithubEnv::RunAttempt => "GITHUB_RUN_ATTEMPT",
            GithubEnv::RunId => "GITHUB_RUN_ID",
            GithubEnv::RunNumber => "GITHUB_RUN_NUMBER",
            GithubEnv::RepositoryOwner => "GITHUB_REPOSITORY_OWNER",
            GithubEnv::RetentionDays => "GITHUB_RETENTION_DAYS",
            GithubEnv::RunnerPerflog => "RUNNER_PERFLOG",
            GithubEnv::RunnerTrackingId => "RUNNER_TRACKING_ID",
            GithubEnv::Repository => "GITHUB_REPOSITORY",
            GithubEnv::Ref => "GITHUB_REF",
            GithubEnv::ShaRef => "SHA_REF",
            GithubEnv::RefName => "GITHUB_REF_NAME",
            GithubEnv::RefType => "GITHUB_REF_TYPE",
            GithubEnv::BaseRef => "GITHUB_BASE_REF",
            GithubEnv::HeadRef => "GITHUB_HEAD_REF",
            GithubEnv::Workspace => "GITHUB_WORKSPACE",
            GithubEnv::ServerUrl => "GITHUB_SERVER_URL",
            GithubEnv::ApiUrl => "GITHUB_API_URL",
            GithubEnv::GraphqlUrl => "GITHUB_GRAPHQL_URL",
        }
    }
}

/// Runner environment of a job before the configured `env` is applied
pub fn runner_defaults(
    config: &HarnessConfig,
    job_id: &str,
    workspace: &Path,
) -> HashMap<String, String> {
    let instance = config.github_instance();
    let (api_url, graphql_url) = if instance == "github.com" {
        (
            "https://api.github.com".to_string(),
            "https://api.github.com/graphql".to_string(),
        )
    } else {
        (
            format!("https://{}/api/v3", instance),
            format!("https://{}/api/graphql", instance),
        )
    };
    let repository = config.repository();
    let owner = repository.split('/').next().unwrap_or(repository);
    let branch = config.default_branch();

    let mut env: HashMap<String, String> = GithubEnv::ALL
        .iter()
        .map(|var| {
            let value = match var {
                GithubEnv::RunAttempt | GithubEnv::RunId | GithubEnv::RunNumber => "1".to_string(),
                GithubEnv::RepositoryOwner => owner.to_string(),
                GithubEnv::RetentionDays => "0".to_string(),
                GithubEnv::RunnerPerflog => "/dev/null".to_string(),
                GithubEnv::RunnerTrackingId => String::new(),
                GithubEnv::Repository => repository.to_string(),
                GithubEnv::Ref => format!("refs/heads/{}", branch),
                GithubEnv::ShaRef => String::new(),
                GithubEnv::RefName => branch.to_string(),
                GithubEnv::RefType => "branch".to_string(),
                GithubEnv::BaseRef | GithubEnv::HeadRef => String::new(),
                GithubEnv::Workspace => workspace.display().to_string(),
                GithubEnv::ServerUrl => format!("https://{}", instance),
                GithubEnv::ApiUrl => api_url.clone(),
                GithubEnv::GraphqlUrl => graphql_url.clone(),
            };
            (var.as_str().to_string(), value)
        })
        .collect();

    env.insert("CI".to_string(), "true".to_string());
    env.insert("GITHUB_ACTIONS".to_string(), "true".to_string());
    env.insert("GITHUB_ACTOR".to_string(), config.actor().to_string());
    env.insert("GITHUB_EVENT_NAME".to_string(), config.event_name().to_string());
    env.insert("GITHUB_JOB".to_string(), job_id.to_string());
    env.insert("RUNNER_OS".to_string(), "Linux".to_string());
    env
}

impl fmt::Display for GithubEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
