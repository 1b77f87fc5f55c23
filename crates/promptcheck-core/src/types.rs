pub use promptcheck_types::{
	Assertion, AssertionFailure, AttemptRecord, EvalResult, EvalSummary, Failure, Outcome, PromptSpec,
	ProviderRef, ProviderRefError, TestCase, TestRef,
};
