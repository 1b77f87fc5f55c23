//! promptcheck-core: declarative evaluation of prompts against LLM providers.
//! Load a spec, register provider capabilities, run every provider × test case
//! through a bounded retry loop, and collect one verdict per combination.
//! See `demos/library_usage.rs` for a quickstart.

pub mod assertion;
pub mod config;
pub mod loader;
pub mod provider;
pub mod retry;
pub mod runner;
pub mod suite;
pub mod template;
pub mod testing;
pub mod types;

pub use assertion::{evaluate_all, AssertionEvaluator, StandardEvaluator};
pub use loader::{load_spec, parse_spec, LoadError};
pub use provider::{from_async_fn, CallError, Provider, ProviderRegistry};
pub use retry::{RetryController, RetryPolicy, RetryState};
pub use runner::{Eval, EvalBuilder};
pub use suite::{check_files, collect_spec_files, run_suite, FileCheck, FileReport, SuiteResult};
pub use template::{Template, TemplateError};
pub use testing::{assert_all_passed, assert_pass_rate, assert_suite_passed};
pub use types::{
    Assertion, AssertionFailure, EvalResult, EvalSummary, Failure, Outcome, PromptSpec, ProviderRef,
    TestCase, TestRef,
};
