//! Running many spec files, each isolated from the others' failures.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::loader::load_spec;
use crate::runner::Eval;
use crate::types::EvalResult;

const SPEC_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Expand inputs into spec file paths.
///
/// Files are taken as given. Directories contribute their `*.yaml` / `*.yml`
/// entries (non-recursive), sorted by name.
pub async fn collect_spec_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let meta = tokio::fs::metadata(input)
            .await
            .with_context(|| format!("Failed to read {:?}", input))?;
        if !meta.is_dir() {
            files.push(input.clone());
            continue;
        }

        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(input)
            .await
            .with_context(|| format!("Failed to list {:?}", input))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !has_spec_extension(&path) {
                continue;
            }
            // Follows symlinks, unlike `DirEntry::file_type`.
            let is_file = tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false);
            if is_file {
                found.push(path);
            }
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

fn has_spec_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SPEC_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    /// Set when the file could not be loaded; no combinations ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<EvalResult>,
}

impl FileReport {
    pub fn passed(&self) -> bool {
        self.result.as_ref().map(EvalResult::all_passed).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteResult {
    pub files: Vec<FileReport>,
}

impl SuiteResult {
    pub fn all_passed(&self) -> bool {
        self.files.iter().all(FileReport::passed)
    }

    /// (combinations, passed combinations, files that failed to load)
    pub fn totals(&self) -> (usize, usize, usize) {
        self.files.iter().fold((0, 0, 0), |(total, passed, broken), f| match &f.result {
            Some(r) => (total + r.summary.total, passed + r.summary.passed, broken),
            None => (total, passed, broken + 1),
        })
    }
}

/// Load and evaluate every file in order. A bad file is reported, never fatal.
pub async fn run_suite(eval: &Eval, paths: &[PathBuf]) -> SuiteResult {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        tracing::info!(path = %path.display(), "Starting evaluation for config");
        let report = match load_spec(path).await {
            Ok(spec) => FileReport {
                path: path.clone(),
                setup_error: None,
                result: Some(eval.run(&spec).await),
            },
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "Spec setup failed");
                FileReport {
                    path: path.clone(),
                    setup_error: Some(err.to_string()),
                    result: None,
                }
            }
        };
        files.push(report);
    }
    SuiteResult { files }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileCheck {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Load every file without calling any provider.
pub async fn check_files(paths: &[PathBuf]) -> Vec<FileCheck> {
    let mut checks = Vec::with_capacity(paths.len());
    for path in paths {
        let check = match load_spec(path).await {
            Ok(spec) => {
                tracing::info!(path = %path.display(), description = spec.description(), "Description found");
                FileCheck {
                    path: path.clone(),
                    description: Some(spec.description().to_string()),
                    error: None,
                }
            }
            Err(err) => FileCheck {
                path: path.clone(),
                description: None,
                error: Some(err.to_string()),
            },
        };
        checks.push(check);
    }
    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{from_async_fn, ProviderRegistry};

    const GOOD: &str = r#"
description: "Echo"
prompt: "Say {word}"
providers: ["echo:default"]
tests:
  - vars: { word: hello }
    asserts:
      - type: contain
        value: hello
"#;

    const NO_DESCRIPTION: &str = r#"
prompt: "Say {word}"
providers: ["echo:default"]
tests: []
"#;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_collect_spec_files_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.yml", GOOD);
        write(dir.path(), "a.yaml", GOOD);
        write(dir.path(), "notes.txt", "ignored");
        std::fs::create_dir(dir.path().join("nested.yaml")).unwrap();
        let explicit = write(dir.path(), "explicit.txt", GOOD);

        let files = collect_spec_files(&[dir.path().to_path_buf(), explicit.clone()])
            .await
            .unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.yaml", "b.yml", "explicit.txt"]);
    }

    #[tokio::test]
    async fn test_collect_missing_input_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_spec_files(&[dir.path().join("absent")]).await.is_err());
    }

    #[tokio::test]
    async fn test_bad_file_does_not_stop_suite() {
        let dir = tempfile::tempdir().unwrap();
        let broken = write(dir.path(), "broken.yaml", NO_DESCRIPTION);
        let good = write(dir.path(), "good.yaml", GOOD);

        let registry = ProviderRegistry::new()
            .with("echo", from_async_fn(|_, prompt| async move { Ok(prompt) }));
        let eval = Eval::builder().registry(registry).build().unwrap();

        let suite = run_suite(&eval, &[broken, good]).await;

        assert_eq!(suite.files.len(), 2);
        assert!(suite.files[0].setup_error.as_deref().unwrap().contains("description"));
        assert!(suite.files[1].passed());
        assert!(!suite.all_passed());
        assert_eq!(suite.totals(), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_check_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = write(dir.path(), "good.yaml", GOOD);
        let broken = write(dir.path(), "broken.yaml", NO_DESCRIPTION);

        let checks = check_files(&[good, broken]).await;
        assert_eq!(checks[0].description.as_deref(), Some("Echo"));
        assert!(checks[0].error.is_none());
        assert!(checks[1].error.is_some());
    }
}
