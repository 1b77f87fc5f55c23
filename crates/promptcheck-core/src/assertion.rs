use crate::types::{Assertion, AssertionFailure};

/// Decides whether a single assertion holds for a response.
///
/// `Err` carries the human-readable failure reason.
pub trait AssertionEvaluator: Send + Sync {
    fn evaluate(&self, response: &str, assertion: &Assertion) -> Result<(), String>;
}

/// The built-in assertion vocabulary.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardEvaluator;

impl AssertionEvaluator for StandardEvaluator {
    fn evaluate(&self, response: &str, assertion: &Assertion) -> Result<(), String> {
        match assertion {
            Assertion::Contain(expected) => {
                if response.contains(expected.as_str()) {
                    Ok(())
                } else {
                    Err(format!("'{expected}' not found in response"))
                }
            }
        }
    }
}

/// Check every assertion against `response` and collect the failures.
///
/// Never stops at the first failure, so every reason is reported.
pub fn evaluate_all(
    evaluator: &dyn AssertionEvaluator,
    response: &str,
    asserts: &[Assertion],
) -> Vec<AssertionFailure> {
    asserts
        .iter()
        .enumerate()
        .filter_map(|(index, assertion)| {
            evaluator
                .evaluate(response, assertion)
                .err()
                .map(|reason| AssertionFailure {
                    index,
                    assertion: assertion.clone(),
                    reason,
                })
        })
        .collect()
}
