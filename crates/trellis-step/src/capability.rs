//! Capability injection.
//!
//! Steps do not construct their own collaborators. External services such as
//! a text-generation client are registered under a name in [`Capabilities`]
//! and handed to step bodies through the [`StepContext`](crate::StepContext).
//! A step declares the names it needs; the executor refuses to invoke a body
//! whose declared capabilities are absent.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::contract::Contract;

/// Well-known capability name for the model-invocation client.
pub const TEXT_GENERATION: &str = "text-generation";

/// An immutable, cheaply cloneable set of named capabilities.
#[derive(Clone, Default)]
pub struct Capabilities {
  inner: Arc<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl Capabilities {
  /// An empty capability set.
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn builder() -> CapabilitiesBuilder {
    CapabilitiesBuilder::default()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.inner.contains_key(name)
  }

  /// Typed lookup. The stored value must have been registered with exactly
  /// the type `T` (for trait objects, register the `Arc<dyn Trait>` itself).
  pub fn get<T: Any + Send + Sync + Clone>(&self, name: &str) -> Option<T> {
    self.inner.get(name)?.downcast_ref::<T>().cloned()
  }

  /// Convenience accessor for the [`TEXT_GENERATION`] capability.
  pub fn text_generation(&self) -> Option<Arc<dyn TextGeneration>> {
    self.get::<Arc<dyn TextGeneration>>(TEXT_GENERATION)
  }
}

#[derive(Default)]
pub struct CapabilitiesBuilder {
  entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl CapabilitiesBuilder {
  /// Register a capability under a name.
  pub fn provide<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
    self.entries.insert(name.into(), Box::new(value));
    self
  }

  /// Register a text-generation client under the well-known name.
  pub fn text_generation(self, client: Arc<dyn TextGeneration>) -> Self {
    self.provide(TEXT_GENERATION, client)
  }

  pub fn build(self) -> Capabilities {
    Capabilities {
      inner: Arc::new(self.entries),
    }
  }
}

/// Output of a [`TextGeneration::generate`] call.
#[derive(Debug, Clone)]
pub struct Generation {
  /// The raw generated text.
  pub text: String,
  /// Structured output when an output contract was requested.
  pub object: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
  #[error("generation failed: {0}")]
  Provider(String),

  #[error("stream interrupted: {0}")]
  Stream(String),
}

/// A lazy, finite, non-restartable sequence of generated text chunks.
pub type TextStream = BoxStream<'static, Result<String, GenerationError>>;

/// The opaque model-invocation client.
///
/// The engine only specifies the call contract; providers live outside the
/// core. Implementations must be safe to share across concurrently running
/// steps.
pub trait TextGeneration: Send + Sync {
  /// Generate a completion for the prompt. When `output_contract` is given,
  /// the provider should also return a structured `object` satisfying it.
  fn generate(
    &self,
    prompt: &str,
    output_contract: Option<&Contract>,
  ) -> BoxFuture<'_, Result<Generation, GenerationError>>;

  /// Generate a completion as an incremental chunk stream. The caller owns
  /// the concatenation; consuming the stream twice is not supported.
  fn generate_stream(&self, prompt: &str) -> BoxFuture<'_, Result<TextStream, GenerationError>>;
}
