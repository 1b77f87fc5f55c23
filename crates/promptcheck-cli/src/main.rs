use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use promptcheck_core::{
	check_files, collect_spec_files, from_async_fn, run_suite, CallError, Eval, Provider,
	ProviderRegistry, RetryPolicy, SuiteResult,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "promptcheck", about = "Evaluate prompt specs against LLM providers")]
struct Cli {
	/// Log filter used when RUST_LOG is unset (e.g. info, debug, promptcheck_core=debug)
	#[arg(long, global = true, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Evaluate every provider × test case in the given spec files
	Run(RunArgs),
	/// Load spec files and report format errors without calling providers
	Check(CheckArgs),
}

#[derive(Debug, Clone, Parser)]
struct RunArgs {
	/// Spec files, or directories containing *.yaml / *.yml spec files
	#[arg(required = true)]
	inputs: Vec<PathBuf>,

	/// Attempts per combination, including the first
	#[arg(long, default_value_t = 3)]
	max_attempts: u32,

	/// Fixed pause between attempts, in milliseconds
	#[arg(long, default_value_t = 1000)]
	delay_ms: u64,

	/// Combinations in flight at once (1 = strictly sequential)
	#[arg(long, default_value_t = 1)]
	concurrency: usize,

	/// Write the full suite result as JSON
	#[arg(long)]
	json_out: Option<PathBuf>,

	/// Base URL of the Ollama server used by `ollama:<model>` providers
	#[arg(long, default_value = "http://localhost:11434")]
	ollama_url: String,

	/// Per-request timeout for HTTP providers, in seconds
	#[arg(long, default_value_t = 120)]
	timeout_secs: u64,
}

#[derive(Debug, Clone, Parser)]
struct CheckArgs {
	/// Spec files, or directories containing *.yaml / *.yml spec files
	#[arg(required = true)]
	inputs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
	let cli = Cli::parse();

	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| cli.log_level.clone().into());
	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.init();

	let passed = match cli.command {
		Commands::Run(args) => run(args).await?,
		Commands::Check(args) => check(args).await?,
	};
	Ok(if passed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn run(args: RunArgs) -> Result<bool> {
	let files = collect_spec_files(&args.inputs).await?;
	if files.is_empty() {
		anyhow::bail!("no spec files found in {:?}", args.inputs);
	}
	tracing::info!(files = files.len(), "Discovered spec files");

	let registry = ProviderRegistry::new()
		.with("echo", echo_provider())
		.with("ollama", ollama_provider(&args.ollama_url, Duration::from_secs(args.timeout_secs))?);

	let eval = Eval::builder()
		.registry(registry)
		.retry_policy(RetryPolicy::new(args.max_attempts, Duration::from_millis(args.delay_ms)))
		.concurrency(args.concurrency)
		.build()?;

	let suite = run_suite(&eval, &files).await;
	print_suite(&suite);

	if let Some(path) = args.json_out {
		let json = serde_json::to_string_pretty(&suite)?;
		tokio::fs::write(path, json).await?;
	}

	Ok(suite.all_passed())
}

async fn check(args: CheckArgs) -> Result<bool> {
	let files = collect_spec_files(&args.inputs).await?;
	let checks = check_files(&files).await;
	let mut ok = true;
	for c in &checks {
		match (&c.description, &c.error) {
			(_, Some(err)) => {
				ok = false;
				println!("FAIL  {}: {}", c.path.display(), err);
			}
			(Some(description), None) => println!("ok    {} ({})", c.path.display(), description),
			(None, None) => println!("ok    {}", c.path.display()),
		}
	}
	Ok(ok)
}

fn print_suite(suite: &SuiteResult) {
	for file in &suite.files {
		println!("== {}", file.path.display());
		if let Some(err) = &file.setup_error {
			println!("Test setup failed: {err}\n");
			continue;
		}
		if let Some(result) = &file.result {
			println!("{}", result.summary_table());
			for outcome in result.outcomes.iter().filter(|o| !o.succeeded) {
				println!("FAILED {} / {}: {}", outcome.provider, outcome.test, outcome.message());
			}
			println!();
		}
	}

	let (total, passed, broken) = suite.totals();
	println!(
		"Files: {}  Setup failures: {}  Combinations: {}  Passed: {}  Failed: {}",
		suite.files.len(),
		broken,
		total,
		passed,
		total - passed
	);
}

/// Returns the prompt unchanged. Useful for dry runs of a spec.
fn echo_provider() -> Arc<dyn Provider> {
	from_async_fn(|_, prompt| async move { Ok(prompt) })
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
	response: String,
}

fn ollama_provider(base_url: &str, timeout: Duration) -> Result<Arc<dyn Provider>> {
	let client = reqwest::Client::builder().timeout(timeout).build()?;
	let url = format!("{}/api/generate", base_url.trim_end_matches('/'));

	Ok(from_async_fn(move |model, prompt| {
		let client = client.clone();
		let url = url.clone();
		async move {
			let resp = client
				.post(&url)
				.json(&json!({ "model": model, "prompt": prompt, "stream": false }))
				.send()
				.await
				.map_err(|e| CallError::failed(e.to_string()))?;
			let status = resp.status();
			if !status.is_success() {
				let body = resp.text().await.unwrap_or_default();
				return Err(CallError::failed(format!("HTTP {}: {}", status.as_u16(), body)));
			}
			let parsed: GenerateResponse = resp
				.json()
				.await
				.map_err(|e| CallError::failed(format!("invalid response body: {e}")))?;
			Ok(parsed.response)
		}
	}))
}
