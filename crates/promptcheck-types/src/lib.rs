use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tabled::{Table, Tabled};
use thiserror::Error;

/// Errors from parsing a `"<kind>:<instance>"` provider reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderRefError {
	#[error("provider '{0}' has no ':' separator (expected '<kind>:<instance>')")]
	MissingSeparator(String),

	#[error("provider '{0}' has more than one ':' separator")]
	TooManySeparators(String),

	#[error("provider '{0}' has an empty kind")]
	EmptyKind(String),

	#[error("provider '{0}' has an empty instance")]
	EmptyInstance(String),
}

/// A provider target: `kind` picks the gateway capability, `instance` the concrete model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderRef {
	pub kind: String,
	pub instance: String,
}

impl ProviderRef {
	pub fn new(kind: impl Into<String>, instance: impl Into<String>) -> Self {
		Self { kind: kind.into(), instance: instance.into() }
	}
}

impl FromStr for ProviderRef {
	type Err = ProviderRefError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut parts = s.split(':');
		let kind = parts.next().unwrap_or_default();
		let instance = parts
			.next()
			.ok_or_else(|| ProviderRefError::MissingSeparator(s.to_string()))?;
		if parts.next().is_some() {
			return Err(ProviderRefError::TooManySeparators(s.to_string()));
		}
		if kind.is_empty() {
			return Err(ProviderRefError::EmptyKind(s.to_string()));
		}
		if instance.is_empty() {
			return Err(ProviderRefError::EmptyInstance(s.to_string()));
		}
		Ok(Self::new(kind, instance))
	}
}

impl fmt::Display for ProviderRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.kind, self.instance)
	}
}

impl Serialize for ProviderRef {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for ProviderRef {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}

/// A single check against a provider response.
///
/// Serialized as `{ "type": "<kind>", "value": <expected> }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Assertion {
	/// Response must contain this literal substring (case-sensitive).
	Contain(String),
}

impl Assertion {
	/// Discriminators accepted in spec files.
	pub const KINDS: &'static [&'static str] = &["contain"];

	pub fn contain(expected: impl Into<String>) -> Self {
		Assertion::Contain(expected.into())
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Assertion::Contain(_) => "contain",
		}
	}

	pub fn expected(&self) -> &str {
		match self {
			Assertion::Contain(s) => s,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default)]
	pub vars: BTreeMap<String, Value>,
	#[serde(default)]
	pub asserts: Vec<Assertion>,
}

impl TestCase {
	pub fn new(vars: BTreeMap<String, Value>, asserts: Vec<Assertion>) -> Self {
		Self { id: None, vars, asserts }
	}

	pub fn with_id(id: impl Into<String>, vars: BTreeMap<String, Value>, asserts: Vec<Assertion>) -> Self {
		Self { id: Some(id.into()), vars, asserts }
	}
}

/// Identity of a test case within its spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRef {
	pub index: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
}

impl fmt::Display for TestRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.id {
			Some(id) => f.write_str(id),
			None => write!(f, "test #{}", self.index + 1),
		}
	}
}

/// A loaded prompt specification. Read-only once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptSpec {
	description: String,
	template: String,
	providers: Vec<ProviderRef>,
	tests: Vec<TestCase>,
}

impl PromptSpec {
	pub fn new(
		description: impl Into<String>,
		template: impl Into<String>,
		providers: Vec<ProviderRef>,
		tests: Vec<TestCase>,
	) -> Self {
		Self {
			description: description.into(),
			template: template.into(),
			providers,
			tests,
		}
	}

	pub fn description(&self) -> &str {
		&self.description
	}

	pub fn template(&self) -> &str {
		&self.template
	}

	pub fn providers(&self) -> &[ProviderRef] {
		&self.providers
	}

	pub fn tests(&self) -> &[TestCase] {
		&self.tests
	}

	pub fn test_ref(&self, index: usize) -> TestRef {
		TestRef {
			index,
			id: self.tests.get(index).and_then(|t| t.id.clone()),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionFailure {
	/// Position of the assertion within its test case.
	pub index: usize,
	pub assertion: Assertion,
	pub reason: String,
}

/// Why a combination (or a single attempt) failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
	/// The template could not be rendered with the test case's vars.
	Format { message: String },
	/// The provider call itself failed.
	Call { message: String },
	/// A response arrived but one or more assertions did not hold.
	Assertions { failures: Vec<AssertionFailure> },
}

impl fmt::Display for Failure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Failure::Format { message } => write!(f, "format error: {message}"),
			Failure::Call { message } => write!(f, "provider call failed: {message}"),
			Failure::Assertions { failures } => {
				let reasons: Vec<&str> = failures.iter().map(|a| a.reason.as_str()).collect();
				write!(f, "{}", reasons.join("; "))
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
	/// 1-based.
	pub attempt: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failure: Option<Failure>,
	pub duration_ms: u64,
}

/// Final verdict for one (provider, test case) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
	pub provider: ProviderRef,
	pub test: TestRef,
	/// `None` only when formatting failed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub formatted_prompt: Option<String>,
	/// Zero only for format failures, which never reach a provider.
	pub attempts_used: u32,
	pub succeeded: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_failure: Option<Failure>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub history: Vec<AttemptRecord>,
	pub duration_ms: u64,
}

impl Outcome {
	/// Human-readable verdict line for reports.
	pub fn message(&self) -> String {
		let prompt = self.formatted_prompt.as_deref().unwrap_or("-");
		let detail = match &self.last_failure {
			None => return format!("Passed after {} attempt(s)", self.attempts_used),
			Some(Failure::Format { message }) => {
				format!("Template formatting failed for {}: {}", self.test, message)
			}
			Some(Failure::Call { message }) => format!(
				"Failed after {} attempts. Last error: {}",
				self.attempts_used, message
			),
			Some(failure @ Failure::Assertions { .. }) => format!(
				"Failed after {} attempts. Assertions did not pass: {}",
				self.attempts_used, failure
			),
		};
		format!("{detail} | Provider: {} | Prompt: {prompt}", self.provider)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
	pub total: usize,
	pub passed: usize,
	pub failed: usize,
	pub pass_rate: f64,
	pub duration_ms: u64,
	pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
	pub description: String,
	pub outcomes: Vec<Outcome>,
	pub summary: EvalSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct SummaryRow {
	provider: String,
	test: String,
	passed: String,
	attempts: u32,
	prompt: String,
	failure: String,
}

impl EvalResult {
	pub fn summarize(outcomes: &[Outcome], started_at: DateTime<Utc>, duration_ms: u64) -> EvalSummary {
		let total = outcomes.len();
		let passed = outcomes.iter().filter(|o| o.succeeded).count();
		let pass_rate = if total == 0 { 0.0 } else { passed as f64 / total as f64 };

		EvalSummary {
			total,
			passed,
			failed: total - passed,
			pass_rate,
			duration_ms,
			started_at,
		}
	}

	pub fn all_passed(&self) -> bool {
		self.summary.failed == 0
	}

	pub fn summary_table(&self) -> String {
		let rows: Vec<SummaryRow> = self.outcomes.iter().map(|o| {
			SummaryRow {
				provider: o.provider.to_string(),
				test: o.test.to_string(),
				passed: if o.succeeded { "✓" } else { "✗" }.to_string(),
				attempts: o.attempts_used,
				prompt: truncate(o.formatted_prompt.clone().unwrap_or_else(|| "-".to_string()), 48),
				failure: o
					.last_failure
					.as_ref()
					.map(|f| truncate(f.to_string(), 64))
					.unwrap_or_default(),
			}
		}).collect();

		let table_str = Table::new(rows).to_string();

		let summary_text = format!(
			"{}: Total: {}  Passed: {}  Failed: {}  Pass rate: {:.1}%  Duration: {:.2}s",
			self.description,
			self.summary.total,
			self.summary.passed,
			self.summary.failed,
			self.summary.pass_rate * 100.0,
			self.summary.duration_ms as f64 / 1000.0
		);

		format!("{}\n\n{}\n", table_str, summary_text)
	}
}

fn truncate(s: String, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_provider_ref_parse() {
		let p: ProviderRef = "openai:gpt-4o-mini".parse().unwrap();
		assert_eq!(p.kind, "openai");
		assert_eq!(p.instance, "gpt-4o-mini");
		assert_eq!(p.to_string(), "openai:gpt-4o-mini");
	}

	#[test]
	fn test_provider_ref_rejects_bad_forms() {
		assert!(matches!("openai".parse::<ProviderRef>(), Err(ProviderRefError::MissingSeparator(_))));
		assert!(matches!("a:b:c".parse::<ProviderRef>(), Err(ProviderRefError::TooManySeparators(_))));
		assert!(matches!(":gpt".parse::<ProviderRef>(), Err(ProviderRefError::EmptyKind(_))));
		assert!(matches!("openai:".parse::<ProviderRef>(), Err(ProviderRefError::EmptyInstance(_))));
	}

	#[test]
	fn test_assertion_wire_shape() {
		let a = Assertion::contain("Paris");
		let v = serde_json::to_value(&a).unwrap();
		assert_eq!(v, serde_json::json!({ "type": "contain", "value": "Paris" }));
		assert_eq!(a.kind(), "contain");
		assert_eq!(a.expected(), "Paris");
	}

	#[test]
	fn test_test_ref_display() {
		assert_eq!(TestRef { index: 0, id: None }.to_string(), "test #1");
		assert_eq!(TestRef { index: 3, id: Some("capital".into()) }.to_string(), "capital");
	}

	fn outcome(succeeded: bool, last_failure: Option<Failure>) -> Outcome {
		Outcome {
			provider: ProviderRef::new("echo", "default"),
			test: TestRef { index: 0, id: None },
			formatted_prompt: Some("What is 2+2?".into()),
			attempts_used: if succeeded { 1 } else { 3 },
			succeeded,
			last_failure,
			history: Vec::new(),
			duration_ms: 0,
		}
	}

	#[test]
	fn test_message_distinguishes_call_and_assertion_failures() {
		let call = outcome(false, Some(Failure::Call { message: "timeout".into() }));
		assert_eq!(
			call.message(),
			"Failed after 3 attempts. Last error: timeout | Provider: echo:default | Prompt: What is 2+2?"
		);

		let asserts = outcome(false, Some(Failure::Assertions {
			failures: vec![AssertionFailure {
				index: 0,
				assertion: Assertion::contain("4"),
				reason: "'4' not found in response".into(),
			}],
		}));
		assert!(asserts.message().starts_with("Failed after 3 attempts. Assertions did not pass: '4' not found"));
	}

	#[test]
	fn test_summarize() {
		let outcomes = vec![
			outcome(true, None),
			outcome(false, Some(Failure::Call { message: "boom".into() })),
		];
		let summary = EvalResult::summarize(&outcomes, Utc::now(), 1500);
		assert_eq!(summary.total, 2);
		assert_eq!(summary.passed, 1);
		assert_eq!(summary.failed, 1);
		assert!((summary.pass_rate - 0.5).abs() < f64::EPSILON);

		let result = EvalResult { description: "demo".into(), outcomes, summary };
		let table = result.summary_table();
		assert!(table.contains("echo:default"));
		assert!(table.contains("Pass rate: 50.0%"));
	}
}
