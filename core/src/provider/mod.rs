//! LLM provider contract (§4.3): stream one completion, normalize content blocks and usage.
//!
//! [`ModelProvider`] is the trait the reconciler depends on. [`openai::AsyncOpenAiProvider`]
//! is the concrete streaming implementation (OpenAI-compatible chat completions, the
//! teacher's own LLM stack); [`mock::MockProvider`] is a scriptable stand-in for tests.
//! [`resilience::ResilientProvider`] and [`factory::ProviderFactory`] add retry-with-jitter
//! and circuit-breaking around either.

mod mock;
mod openai;
pub mod resilience;
pub mod factory;

pub use mock::MockProvider;
pub use openai::AsyncOpenAiProvider;
pub use factory::ProviderFactory;
pub use resilience::ResilientProvider;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::message::{Block, Message, Usage};

/// Description of a native tool the model may call, aligned with MCP `tools/list`.
#[derive(Clone, Debug)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Provider-specific typed bag validated by the provider itself.
#[derive(Clone, Debug, Default)]
pub struct ModelProfile {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// When true and the provider supports ephemeral prompt caching, the system
    /// prompt and the last two user/tool-result blocks are marked as cache anchors.
    pub enable_prompt_caching: bool,
}

/// Per-call options for [`ModelProvider::invoke_model`].
pub struct InvokeOptions {
    pub tools: Vec<ToolDescriptor>,
    /// Invoked at least once per text delta; never invoked after the call returns.
    pub on_chunk: Option<std::sync::Arc<dyn Fn(&str) + Send + Sync>>,
    pub model_profile: ModelProfile,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            on_chunk: None,
            model_profile: ModelProfile::default(),
        }
    }
}

/// One completion's content blocks plus accumulated usage; the reconciler wraps
/// this into a persisted [`Message`] (it owns task id, message id, timestamps).
pub struct ProviderResponse {
    pub content: Vec<Block>,
    pub usage: Usage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    InvalidRequest,
    RateLimited,
    Overloaded,
    Internal,
    Unknown,
}

#[derive(Debug, Error)]
#[error("provider error ({kind:?}): {cause}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub retry_after: Option<Duration>,
    pub cause: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            retry_after: None,
            cause: cause.into(),
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Only `{rate_limited, overloaded, internal}` are retryable (§4.3).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::RateLimited | ProviderErrorKind::Overloaded | ProviderErrorKind::Internal
        )
    }
}

/// Streams one completion from an external LLM API.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn invoke_model(
        &self,
        model_name: &str,
        system_prompt: &str,
        messages: &[Message],
        opts: InvokeOptions,
    ) -> Result<ProviderResponse, ProviderError>;
}
