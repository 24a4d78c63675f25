//! Scriptable mock provider (mirrors the teacher's `MockLlm`): a fixed queue of
//! canned responses consumed in call order, for reconciler scenario tests.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::message::Message;

use super::{InvokeOptions, ModelProvider, ProviderError, ProviderResponse};

type Scripted = Result<ProviderResponse, ProviderError>;

/// Returns one scripted response per call, in order; panics (via `expect`) if
/// called more times than scripted, since that indicates a test bug rather than
/// a real failure mode.
pub struct MockProvider {
    responses: Mutex<std::collections::VecDeque<Scripted>>,
}

impl MockProvider {
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn invoke_model(
        &self,
        _model_name: &str,
        _system_prompt: &str,
        _messages: &[Message],
        opts: InvokeOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        let next = self
            .responses
            .lock()
            .await
            .pop_front()
            .expect("MockProvider called more times than scripted");
        if let (Ok(resp), Some(on_chunk)) = (&next, &opts.on_chunk) {
            for block in &resp.content {
                if let crate::message::Block::Text { text } = block {
                    on_chunk(text);
                }
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Block, Usage};

    #[tokio::test]
    async fn returns_scripted_responses_in_order() {
        let provider = MockProvider::new(vec![
            Ok(ProviderResponse {
                content: vec![Block::Text { text: "first".into() }],
                usage: Usage::default(),
            }),
            Ok(ProviderResponse {
                content: vec![Block::Text { text: "second".into() }],
                usage: Usage::default(),
            }),
        ]);
        let r1 = provider
            .invoke_model("m", "sys", &[], InvokeOptions::default())
            .await
            .unwrap();
        assert!(matches!(&r1.content[0], Block::Text { text } if text == "first"));
        let r2 = provider
            .invoke_model("m", "sys", &[], InvokeOptions::default())
            .await
            .unwrap();
        assert!(matches!(&r2.content[0], Block::Text { text } if text == "second"));
    }
}
