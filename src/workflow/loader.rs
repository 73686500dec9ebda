//! Workflow loader
//!
//! Load a workflow file, or every workflow YAML file of a directory.

use std::path::Path;

use super::Workflow;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },
}

pub struct WorkflowLoader;

impl WorkflowLoader {
    /// Load `path` as a single workflow file, or as a directory of workflows
    pub fn load_path(path: &Path) -> Result<Vec<Workflow>, LoadError> {
        if path.is_dir() {
            Self::load_directory(path)
        } else {
            Ok(vec![Self::load_file(path)?])
        }
    }

    /// Load every `.yaml` / `.yml` file of `dir`, ordered by file name
    pub fn load_directory(dir: &Path) -> Result<Vec<Workflow>, LoadError> {
        let io_error = |source| LoadError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if path.is_file() && (ext == Some("yaml") || ext == Some("yml")) {
                paths.push(path);
            }
        }
        paths.sort();

        paths.iter().map(|path| Self::load_file(path)).collect()
    }

    pub fn load_file(path: &Path) -> Result<Workflow, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
            file: path.display().to_string(),
            error: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_directory() {
        let dir = tempdir().unwrap();

        fs::write(
            dir.path().join("b-workflow.yaml"),
            r#"
name: workflow-b
on: push
jobs:
  test:
    steps:
      - run: echo b
"#,
        )
        .unwrap();

        fs::write(
            dir.path().join("a-workflow.yml"),
            r#"
name: workflow-a
on: push
jobs:
  test:
    steps:
      - run: echo a
"#,
        )
        .unwrap();

        fs::write(dir.path().join("not-a-workflow.txt"), "ignored").unwrap();

        let workflows = WorkflowLoader::load_directory(dir.path()).unwrap();
        let names: Vec<_> = workflows.iter().map(|w| w.display_name()).collect();
        assert_eq!(names, vec!["workflow-a", "workflow-b"]);
    }

    #[test]
    fn test_load_path_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("single.yaml");

        fs::write(
            &path,
            r#"
name: single-workflow
jobs:
  test:
    steps:
      - run: echo hi
"#,
        )
        .unwrap();

        let workflows = WorkflowLoader::load_path(&path).unwrap();
        assert_eq!(workflows.len(), 1);
        assert_eq!(workflows[0].display_name(), "single-workflow");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        let missing = WorkflowLoader::load_file(&dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(LoadError::Io { .. })));

        let path = dir.path().join("broken.yaml");
        fs::write(&path, "jobs: [unclosed").unwrap();
        let broken = WorkflowLoader::load_file(&path);
        assert!(matches!(broken, Err(LoadError::Yaml { .. })));
    }
}
