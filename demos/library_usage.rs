// Example: evaluating a prompt spec from Rust
//
// Run this with: cargo run -p promptcheck-core --example library_usage

use std::time::Duration;

use promptcheck_core::*;

const SPEC: &str = r#"
description: "Greeting"
prompt: "Say hello to {name}."
providers:
  - "canned:v1"
  - "canned:v2"
tests:
  - vars: { name: Ada }
    asserts:
      - type: contain
        value: Ada
  - vars: { name: Grace }
    asserts:
      - type: contain
        value: Hello
      - type: contain
        value: Grace
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let spec = parse_spec(SPEC)?;

	// A provider kind maps to one capability; the instance name is passed through.
	let canned = from_async_fn(|instance, prompt| async move {
		let name = prompt.trim_start_matches("Say hello to ").trim_end_matches('.');
		match instance.as_str() {
			"v1" => Ok(format!("Hello, {name}!")),
			_ => Err(CallError::failed("model v2 is not deployed")),
		}
	});

	let eval = Eval::builder()
		.registry(ProviderRegistry::new().with("canned", canned))
		.max_attempts(2)
		.delay(Duration::from_millis(200))
		.build()?;

	let result = eval.run(&spec).await;
	println!("{}", result.summary_table());
	for outcome in result.outcomes.iter().filter(|o| !o.succeeded) {
		println!("{}", outcome.message());
	}

	Ok(())
}
