use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::ProviderRef;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
	#[error("{0}")]
	Failed(String),

	#[error("unknown provider kind '{kind}' (available: {available})")]
	UnknownKind { kind: String, available: String },
}

impl CallError {
	pub fn failed(message: impl Into<String>) -> Self {
		CallError::Failed(message.into())
	}
}

/// A provider capability: send a prompt to a named instance, get text back.
#[async_trait]
pub trait Provider: Send + Sync {
	async fn call(&self, instance: &str, prompt: &str) -> Result<String, CallError>;
}

/// Wrap an async closure `(instance, prompt) -> Result<String, CallError>` as a `Provider`.
pub fn from_async_fn<F, Fut>(f: F) -> Arc<dyn Provider>
where
	F: Send + Sync + 'static + Fn(String, String) -> Fut,
	Fut: Future<Output = Result<String, CallError>> + Send + 'static,
{
	struct ClosureProvider<F> {
		f: F,
	}

	#[async_trait]
	impl<F, Fut> Provider for ClosureProvider<F>
	where
		F: Send + Sync + 'static + Fn(String, String) -> Fut,
		Fut: Future<Output = Result<String, CallError>> + Send + 'static,
	{
		async fn call(&self, instance: &str, prompt: &str) -> Result<String, CallError> {
			(self.f)(instance.to_string(), prompt.to_string()).await
		}
	}

	Arc::new(ClosureProvider { f })
}

/// Maps provider kinds to the capability that serves them.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
	providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a capability. Replaces any existing one for the same kind.
	pub fn register(&mut self, kind: impl Into<String>, provider: Arc<dyn Provider>) {
		self.providers.insert(kind.into(), provider);
	}

	pub fn with(mut self, kind: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
		self.register(kind, provider);
		self
	}

	pub fn kinds(&self) -> Vec<&str> {
		self.providers.keys().map(String::as_str).collect()
	}

	pub fn contains(&self, kind: &str) -> bool {
		self.providers.contains_key(kind)
	}

	pub async fn call(&self, provider: &ProviderRef, prompt: &str) -> Result<String, CallError> {
		let capability = self
			.providers
			.get(&provider.kind)
			.ok_or_else(|| CallError::UnknownKind {
				kind: provider.kind.clone(),
				available: self.kinds().join(", "),
			})?;
		capability.call(&provider.instance, prompt).await
	}
}
