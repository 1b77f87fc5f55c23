use crate::suite::SuiteResult;
use crate::types::EvalResult;
use anyhow::Result;

/// Fail unless every combination passed, listing each failure.
///
/// Use this in your `#[tokio::test]` functions.
///
/// # Example
/// ```ignore
/// #[tokio::test]
/// async fn capitals_prompt() -> Result<()> {
///     let spec = load_spec("specs/capitals.yaml").await?;
///     let eval = Eval::builder().registry(registry).build()?;
///
///     let result = eval.run(&spec).await;
///     assert_all_passed(&result)?;
///
///     Ok(())
/// }
/// ```
pub fn assert_all_passed(result: &EvalResult) -> Result<()> {
    if !result.all_passed() {
        let failures: Vec<String> = result
            .outcomes
            .iter()
            .filter(|o| !o.succeeded)
            .map(|o| o.message())
            .collect();
        anyhow::bail!(
            "Evaluation failed: {}/{} combinations passed\n{}\n{}",
            result.summary.passed,
            result.summary.total,
            failures.join("\n"),
            result.summary_table()
        );
    }
    Ok(())
}

/// Helper to assert the pass rate meets a threshold.
pub fn assert_pass_rate(result: &EvalResult, min_pass_rate: f64) -> Result<()> {
    if result.summary.pass_rate < min_pass_rate {
        anyhow::bail!(
            "Evaluation failed: pass rate {:.1}% is below threshold {:.1}%\n{}",
            result.summary.pass_rate * 100.0,
            min_pass_rate * 100.0,
            result.summary_table()
        );
    }
    Ok(())
}

/// Helper to assert every file in a suite loaded and passed.
pub fn assert_suite_passed(suite: &SuiteResult) -> Result<()> {
    for file in &suite.files {
        if let Some(err) = &file.setup_error {
            anyhow::bail!("Test setup failed: {err}, for file: {}", file.path.display());
        }
        if let Some(result) = &file.result {
            assert_all_passed(result)?;
        }
    }
    Ok(())
}
