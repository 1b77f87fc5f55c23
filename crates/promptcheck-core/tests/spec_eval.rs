use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use promptcheck_core::*;

const SPEC: &str = r#"
description: "Arithmetic"
prompt: "Compute {a} + {b}. Reply with the number only."
providers:
  - "calc:exact"
  - "flaky:one-failure"
  - "offline:none"
tests:
  - id: small
    vars: { a: 2, b: 2 }
    asserts:
      - type: contain
        value: "4"
  - id: large
    vars: { a: 40, b: 2 }
    asserts:
      - type: contain
        value: "42"
  - id: missing-var
    vars: { a: 1 }
    asserts: []
"#;

fn answer(prompt: &str) -> String {
    let nums: Vec<i64> = prompt
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|s| s.parse().ok())
        .collect();
    nums.iter().sum::<i64>().to_string()
}

fn registry(flaky_calls: Arc<AtomicU32>) -> ProviderRegistry {
    ProviderRegistry::new()
        .with("calc", from_async_fn(|_, prompt| async move { Ok(answer(&prompt)) }))
        .with(
            "flaky",
            from_async_fn(move |_, prompt| {
                let n = flaky_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n % 2 == 0 {
                        Err(CallError::failed("429 Too Many Requests"))
                    } else {
                        Ok(answer(&prompt))
                    }
                }
            }),
        )
        .with(
            "offline",
            from_async_fn(|_, _| async { Err(CallError::failed("connection refused")) }),
        )
}

#[tokio::test(start_paused = true)]
async fn evaluates_every_provider_test_combination() -> anyhow::Result<()> {
    let spec = parse_spec(SPEC)?;
    let flaky_calls = Arc::new(AtomicU32::new(0));
    let eval = Eval::builder()
        .registry(registry(flaky_calls.clone()))
        .delay(Duration::from_millis(500))
        .build()?;

    let result = eval.run(&spec).await;

    // 3 providers × 3 tests, providers outer.
    assert_eq!(result.outcomes.len(), 9);
    for (i, outcome) in result.outcomes.iter().enumerate() {
        assert_eq!(outcome.provider, spec.providers()[i / 3]);
        assert_eq!(outcome.test.index, i % 3);
    }

    let calc = &result.outcomes[0..3];
    assert!(calc[0].succeeded && calc[1].succeeded);
    assert_eq!(calc[0].formatted_prompt.as_deref(), Some("Compute 2 + 2. Reply with the number only."));
    assert!(matches!(calc[2].last_failure, Some(Failure::Format { .. })));

    // Flaky provider fails every other call, so each test passes on its second attempt.
    let flaky = &result.outcomes[3..6];
    assert!(flaky[0].succeeded && flaky[1].succeeded);
    assert_eq!(flaky[0].attempts_used, 2);
    assert_eq!(flaky[1].attempts_used, 2);
    assert_eq!(flaky_calls.load(Ordering::SeqCst), 4);

    let offline = &result.outcomes[6..9];
    assert!(!offline[0].succeeded);
    assert_eq!(offline[0].attempts_used, 3);
    let message = offline[0].message();
    assert!(message.starts_with("Failed after 3 attempts. Last error: connection refused"));
    assert!(message.ends_with("| Provider: offline:none | Prompt: Compute 2 + 2. Reply with the number only."));

    assert_eq!(result.summary.total, 9);
    assert_eq!(result.summary.passed, 4);
    assert!(assert_all_passed(&result).is_err());
    assert_pass_rate(&result, 0.4)?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn passing_spec_satisfies_helpers() -> anyhow::Result<()> {
    let spec = parse_spec(
        r#"
description: "Calculator only"
prompt: "{a} plus {b}"
providers: ["calc:exact"]
tests:
  - vars: { a: 1, b: 1 }
    asserts: [{ type: contain, value: "2" }]
"#,
    )?;
    let eval = Eval::builder().registry(registry(Arc::new(AtomicU32::new(0)))).build()?;
    let result = eval.run(&spec).await;
    assert_all_passed(&result)?;
    assert!(result.summary_table().contains("Calculator only"));
    Ok(())
}
