//! Provider adapters and the registry that holds them.
//!
//! [`ProviderAdapter`] is the one trait every backend implements. Two HTTP
//! adapters ship with the crate: [`OpenAiCompatibleAdapter`] for
//! `/chat/completions`-style services and [`OllamaAdapter`] for local
//! Ollama models. Anything else plugs in by implementing the trait.

pub mod backpressure;
mod http;
pub mod ollama;
pub mod openai_compat;
pub mod registry;
pub mod traits;

pub use backpressure::{DEFAULT_STREAM_BUFFER, bounded_stream};
pub use ollama::{DEFAULT_OLLAMA_URL, OllamaAdapter};
pub use openai_compat::OpenAiCompatibleAdapter;
pub use registry::{DEFAULT_EXPECTED_OUTPUT_TOKENS, Provider, ProviderOptions, ProviderRegistry};
pub use traits::{EventStream, ProviderAdapter, ProviderMetadata};
