//! Bounded call/verify loop for a single (provider, test case) combination.
//!
//! Each attempt calls the provider and, if a response arrives, checks every
//! assertion. A passing attempt ends the loop at once. A failing attempt is
//! followed by a fixed pause unless the attempt budget is spent. The pause is
//! the same on every retry; there is no backoff.

use std::time::Duration;

use tokio::time::Instant;

use crate::assertion::{evaluate_all, AssertionEvaluator};
use crate::provider::ProviderRegistry;
use crate::types::{Assertion, AttemptRecord, Failure, ProviderRef};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt and is clamped to at least 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Fixed pause between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    Succeeded,
    Exhausted,
}

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Passed,
    Failed,
}

impl RetryState {
    pub fn start() -> Self {
        RetryState::Attempting { attempt: 1 }
    }

    /// Next state after `attempt` finished with `result`.
    pub fn after(attempt: u32, result: AttemptResult, policy: &RetryPolicy) -> Self {
        match result {
            AttemptResult::Passed => RetryState::Succeeded,
            AttemptResult::Failed if attempt < policy.max_attempts => {
                RetryState::Attempting { attempt: attempt + 1 }
            }
            AttemptResult::Failed => RetryState::Exhausted,
        }
    }
}

/// What the retry loop produced for one combination.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted {
    pub attempts_used: u32,
    pub succeeded: bool,
    pub last_failure: Option<Failure>,
    pub history: Vec<AttemptRecord>,
}

pub struct RetryController<'a> {
    registry: &'a ProviderRegistry,
    evaluator: &'a dyn AssertionEvaluator,
    policy: RetryPolicy,
}

impl<'a> RetryController<'a> {
    pub fn new(
        registry: &'a ProviderRegistry,
        evaluator: &'a dyn AssertionEvaluator,
        policy: RetryPolicy,
    ) -> Self {
        Self { registry, evaluator, policy }
    }

    pub async fn run(&self, provider: &ProviderRef, prompt: &str, asserts: &[Assertion]) -> Attempted {
        let max_attempts = self.policy.max_attempts;
        let mut history: Vec<AttemptRecord> = Vec::new();
        let mut state = RetryState::start();

        while let RetryState::Attempting { attempt } = state {
            tracing::info!(%provider, attempt, max_attempts, "Attempt {attempt}/{max_attempts} with {provider}");
            let started = Instant::now();
            let (result, failure) = self.attempt(provider, prompt, asserts).await;
            history.push(AttemptRecord {
                attempt,
                failure,
                duration_ms: started.elapsed().as_millis() as u64,
            });

            state = RetryState::after(attempt, result, &self.policy);
            match state {
                RetryState::Attempting { .. } => {
                    tracing::info!(%provider, delay = ?self.policy.delay, "Retrying after delay");
                    tokio::time::sleep(self.policy.delay).await;
                }
                RetryState::Succeeded => {
                    tracing::info!(%provider, attempt, "All assertions passed");
                }
                RetryState::Exhausted => {
                    tracing::warn!(%provider, attempts = attempt, "Attempts exhausted");
                }
            }
        }

        let succeeded = state == RetryState::Succeeded;
        let last_failure = if succeeded {
            None
        } else {
            history.last().and_then(|r| r.failure.clone())
        };

        Attempted {
            attempts_used: history.len() as u32,
            succeeded,
            last_failure,
            history,
        }
    }

    async fn attempt(
        &self,
        provider: &ProviderRef,
        prompt: &str,
        asserts: &[Assertion],
    ) -> (AttemptResult, Option<Failure>) {
        let response = match self.registry.call(provider, prompt).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(%provider, error = %err, "Provider call failed");
                return (
                    AttemptResult::Failed,
                    Some(Failure::Call { message: err.to_string() }),
                );
            }
        };

        let failures = evaluate_all(self.evaluator, &response, asserts);
        if failures.is_empty() {
            return (AttemptResult::Passed, None);
        }
        for f in &failures {
            tracing::warn!(%provider, assertion = f.index, "Assertion failed: {}", f.reason);
        }
        (
            AttemptResult::Failed,
            Some(Failure::Assertions { failures }),
        )
    }
}
