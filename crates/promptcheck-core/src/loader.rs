use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{AssertEntry, SpecFile, TestEntry};
use crate::template::{value_text, Template, TemplateError};
use crate::types::{Assertion, PromptSpec, ProviderRef, ProviderRefError, TestCase};

/// Errors that make a whole spec file unusable.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("'providers' must list at least one provider")]
    EmptyProviders,

    #[error("invalid provider at index {index}: {source}")]
    InvalidProvider {
        index: usize,
        #[source]
        source: ProviderRefError,
    },

    #[error("test #{test}: unknown assertion type '{kind}' (known: {known})")]
    UnknownAssertionKind {
        test: usize,
        kind: String,
        known: String,
    },

    #[error("invalid prompt template: {0}")]
    Template(#[from] TemplateError),
}

/// Parse and validate a spec from YAML text.
pub fn parse_spec(yaml: &str) -> Result<PromptSpec, LoadError> {
    let raw: SpecFile = serde_yaml::from_str(yaml)?;
    from_raw(raw)
}

/// Read a spec file from disk.
pub async fn load_spec(path: impl AsRef<Path>) -> Result<PromptSpec, LoadError> {
    let path = path.as_ref();
    let content = read_to_string(path).await?;
    let spec = parse_spec(&content)?;
    tracing::debug!(
        path = %path.display(),
        description = spec.description(),
        providers = spec.providers().len(),
        tests = spec.tests().len(),
        "Loaded prompt spec"
    );
    Ok(spec)
}

fn from_raw(raw: SpecFile) -> Result<PromptSpec, LoadError> {
    let description = raw
        .description
        .filter(|d| !d.trim().is_empty())
        .ok_or(LoadError::MissingField("description"))?;
    let prompt = raw.prompt.ok_or(LoadError::MissingField("prompt"))?;
    let providers = raw.providers.ok_or(LoadError::MissingField("providers"))?;
    let tests = raw.tests.ok_or(LoadError::MissingField("tests"))?;

    Template::parse(&prompt)?;

    if providers.is_empty() {
        return Err(LoadError::EmptyProviders);
    }
    let providers = providers
        .iter()
        .enumerate()
        .map(|(index, p)| {
            p.parse::<ProviderRef>()
                .map_err(|source| LoadError::InvalidProvider { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let tests = tests
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| test_case(idx, entry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PromptSpec::new(description, prompt, providers, tests))
}

fn test_case(idx: usize, entry: TestEntry) -> Result<TestCase, LoadError> {
    let asserts = entry
        .asserts
        .iter()
        .map(|a| assertion(idx, a))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TestCase {
        id: entry.id,
        vars: entry.vars,
        asserts,
    })
}

fn assertion(test: usize, entry: &AssertEntry) -> Result<Assertion, LoadError> {
    match entry.kind.as_str() {
        "contain" => Ok(Assertion::Contain(value_text(&entry.value))),
        other => Err(LoadError::UnknownAssertionKind {
            test: test + 1,
            kind: other.to_string(),
            known: Assertion::KINDS.join(", "),
        }),
    }
}

#[cfg(not(feature = "sync-fs"))]
async fn read_to_string(path: &Path) -> Result<String, LoadError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })
}

#[cfg(feature = "sync-fs")]
async fn read_to_string(path: &Path) -> Result<String, LoadError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || std::fs::read_to_string(&owned))
        .await
        .map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?
        .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })
}
