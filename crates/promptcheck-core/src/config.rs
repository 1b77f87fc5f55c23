use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// On-disk shape of a prompt spec file, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecFile {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub providers: Option<Vec<String>>,
    #[serde(default)]
    pub tests: Option<Vec<TestEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
    #[serde(default)]
    pub asserts: Vec<AssertEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
}
