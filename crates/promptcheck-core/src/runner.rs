use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use crate::assertion::{AssertionEvaluator, StandardEvaluator};
use crate::provider::ProviderRegistry;
use crate::retry::{RetryController, RetryPolicy};
use crate::template::Template;
use crate::types::{EvalResult, Failure, Outcome, PromptSpec, ProviderRef, TestCase, TestRef};

pub struct EvalBuilder {
	registry: Option<Arc<ProviderRegistry>>,
	evaluator: Arc<dyn AssertionEvaluator>,
	retry_policy: RetryPolicy,
	concurrency: usize,
}

impl Default for EvalBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl EvalBuilder {
	pub fn new() -> Self {
		Self {
			registry: None,
			evaluator: Arc::new(StandardEvaluator),
			retry_policy: RetryPolicy::default(),
			concurrency: 1,
		}
	}

	pub fn registry(mut self, registry: ProviderRegistry) -> Self {
		self.registry = Some(Arc::new(registry));
		self
	}

	pub fn evaluator(mut self, evaluator: Arc<dyn AssertionEvaluator>) -> Self {
		self.evaluator = evaluator;
		self
	}

	pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.retry_policy = policy;
		self
	}

	pub fn max_attempts(mut self, n: u32) -> Self {
		self.retry_policy = RetryPolicy::new(n, self.retry_policy.delay());
		self
	}

	pub fn delay(mut self, delay: Duration) -> Self {
		self.retry_policy = RetryPolicy::new(self.retry_policy.max_attempts(), delay);
		self
	}

	/// Combinations in flight at once. 1 (the default) runs strictly in order.
	pub fn concurrency(mut self, n: usize) -> Self {
		self.concurrency = n.max(1);
		self
	}

	pub fn build(self) -> Result<Eval> {
		Ok(Eval {
			registry: self.registry.ok_or_else(|| anyhow::anyhow!("registry must be set"))?,
			evaluator: self.evaluator,
			retry_policy: self.retry_policy,
			concurrency: self.concurrency,
		})
	}
}

/// Runs every (provider, test case) combination of a spec.
pub struct Eval {
	registry: Arc<ProviderRegistry>,
	evaluator: Arc<dyn AssertionEvaluator>,
	retry_policy: RetryPolicy,
	concurrency: usize,
}

impl Eval {
	pub fn builder() -> EvalBuilder {
		EvalBuilder::new()
	}

	pub fn retry_policy(&self) -> RetryPolicy {
		self.retry_policy
	}

	/// Evaluate `spec`, returning one outcome per provider × test case,
	/// providers outer and tests inner. No failure stops the run.
	pub async fn run(&self, spec: &PromptSpec) -> EvalResult {
		let started_at = Utc::now();
		let started = Instant::now();
		tracing::info!(
			description = spec.description(),
			providers = spec.providers().len(),
			tests = spec.tests().len(),
			"Starting evaluation"
		);

		for provider in spec.providers() {
			if !self.registry.contains(&provider.kind) {
				tracing::warn!(
					%provider,
					available = ?self.registry.kinds(),
					"No capability registered for provider kind '{}'; its calls will fail",
					provider.kind
				);
			}
		}

		let template = Template::parse(spec.template());
		let combinations = spec.providers().iter().flat_map(move |provider| {
			spec.tests()
				.iter()
				.enumerate()
				.map(move |(index, case)| (provider, index, case))
		});

		let template = &template;
		let outcomes: Vec<Outcome> = stream::iter(combinations)
			.map(|(provider, index, case)| async move {
				if index == 0 {
					tracing::info!(%provider, "Testing prompt '{}' with provider {provider}", spec.template());
				}
				let formatted = template
					.as_ref()
					.map_err(|e| e.to_string())
					.and_then(|t| t.render(&case.vars).map_err(|e| e.to_string()));
				self.run_combination(provider, spec.test_ref(index), case, formatted).await
			})
			.buffered(self.concurrency)
			.collect()
			.await;

		let duration_ms = started.elapsed().as_millis() as u64;
		let summary = EvalResult::summarize(&outcomes, started_at, duration_ms);
		tracing::info!(
			description = spec.description(),
			total = summary.total,
			passed = summary.passed,
			failed = summary.failed,
			"Evaluation completed: {} combinations in {:.2}s",
			summary.total,
			duration_ms as f64 / 1000.0
		);

		EvalResult {
			description: spec.description().to_string(),
			outcomes,
			summary,
		}
	}

	async fn run_combination(
		&self,
		provider: &ProviderRef,
		test: TestRef,
		case: &TestCase,
		formatted: std::result::Result<String, String>,
	) -> Outcome {
		let started = Instant::now();
		let prompt = match formatted {
			Ok(prompt) => prompt,
			Err(message) => {
				tracing::error!(%provider, %test, error = %message, "Template formatting failed");
				return Outcome {
					provider: provider.clone(),
					test,
					formatted_prompt: None,
					attempts_used: 0,
					succeeded: false,
					last_failure: Some(Failure::Format { message }),
					history: Vec::new(),
					duration_ms: 0,
				};
			}
		};

		let controller = RetryController::new(&self.registry, self.evaluator.as_ref(), self.retry_policy);
		let attempted = controller.run(provider, &prompt, &case.asserts).await;

		if !attempted.succeeded {
			tracing::warn!(%provider, %test, attempts = attempted.attempts_used, "Combination failed");
		}

		Outcome {
			provider: provider.clone(),
			test,
			formatted_prompt: Some(prompt),
			attempts_used: attempted.attempts_used,
			succeeded: attempted.succeeded,
			last_failure: attempted.last_failure,
			history: attempted.history,
			duration_ms: started.elapsed().as_millis() as u64,
		}
	}
}
