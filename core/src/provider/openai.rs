//! OpenAI-compatible chat-completions provider (mirrors the teacher's `ChatOpenAI`).
//!
//! Streams when `opts.on_chunk` is set (via `create_stream`), otherwise issues a
//! single non-streaming `create` call. Tool descriptors become OpenAI function
//! tools; returned `tool_calls` become `Block::NativeToolCall`s following the
//! persisted message's text block.

use async_trait::async_trait;
use tokio_stream::StreamExt;
use tracing::{debug, instrument, trace};

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageFunctionToolCall, ChatCompletionMessageToolCalls,
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessage,
        ChatCompletionRequestToolMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionTool, ChatCompletionToolChoiceOption, ChatCompletionTools,
        CreateChatCompletionRequestArgs, FunctionCall, FunctionObject, ToolChoiceOptions,
    },
    Client,
};

use crate::message::{Block, Message, MessageSource, Usage};
use crate::proto::CODE_INTERPRETER_TOOL_NAME;

use super::{InvokeOptions, ModelProvider, ProviderError, ProviderErrorKind, ProviderResponse, ToolDescriptor};

fn text_of(content: &[Block]) -> String {
    content
        .iter()
        .filter_map(|b| match b {
            Block::Text { text } => Some(text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct AsyncOpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl AsyncOpenAiProvider {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    pub fn with_config(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
        }
    }

    fn tools_to_request(tools: &[ToolDescriptor]) -> Vec<ChatCompletionTools> {
        tools
            .iter()
            .map(|t| {
                ChatCompletionTools::Function(ChatCompletionTool {
                    function: FunctionObject {
                        name: t.name.clone(),
                        description: Some(t.description.clone()),
                        parameters: Some(t.input_schema.clone()),
                        ..Default::default()
                    },
                })
            })
            .collect()
    }

    fn messages_to_request(
        system_prompt: &str,
        messages: &[Message],
    ) -> Vec<ChatCompletionRequestMessage> {
        let mut out = vec![ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessage::from(system_prompt),
        )];
        for m in messages {
            match m.source {
                MessageSource::User => {
                    let text = text_of(&m.content);
                    out.push(ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessage::from(text.as_str()),
                    ));
                }
                MessageSource::Assistant => {
                    let text = text_of(&m.content);
                    let tool_calls: Vec<ChatCompletionMessageToolCalls> = m
                        .content
                        .iter()
                        .filter_map(|b| match b {
                            Block::NativeToolCall { id, name, input } => Some(
                                ChatCompletionMessageToolCalls::Function(ChatCompletionMessageFunctionToolCall {
                                    id: id.clone(),
                                    function: FunctionCall {
                                        name: name.clone(),
                                        arguments: serde_json::to_string(input).unwrap_or_default(),
                                    },
                                }),
                            ),
                            Block::CodeInterpreterCall { id, script } => Some(
                                ChatCompletionMessageToolCalls::Function(ChatCompletionMessageFunctionToolCall {
                                    id: id.clone(),
                                    function: FunctionCall {
                                        name: CODE_INTERPRETER_TOOL_NAME.to_string(),
                                        arguments: serde_json::json!({ "script": script }).to_string(),
                                    },
                                }),
                            ),
                            _ => None,
                        })
                        .collect();

                    let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                    if !text.is_empty() {
                        builder.content(text.as_str());
                    }
                    if !tool_calls.is_empty() {
                        builder.tool_calls(tool_calls);
                    }
                    let assistant = builder.build().unwrap_or_else(|_| text.as_str().into());
                    out.push(ChatCompletionRequestMessage::Assistant(assistant));
                }
                MessageSource::System => {
                    for block in &m.content {
                        let (tool_call_id, content) = match block {
                            Block::NativeToolResult { call_id, result, .. } => {
                                (call_id.clone(), serde_json::to_string(result).unwrap_or_default())
                            }
                            Block::CodeInterpreterResult { call_id, console_output, .. } => {
                                (call_id.clone(), console_output.clone())
                            }
                            Block::Text { text } => {
                                out.push(ChatCompletionRequestMessage::System(
                                    ChatCompletionRequestSystemMessage::from(text.as_str()),
                                ));
                                continue;
                            }
                            _ => continue,
                        };
                        out.push(ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                            content: ChatCompletionRequestToolMessageContent::Text(content),
                            tool_call_id,
                        }));
                    }
                }
            }
        }
        out
    }

    fn classify_error(e: impl std::fmt::Display) -> ProviderError {
        let msg = e.to_string();
        let lower = msg.to_lowercase();
        let kind = if lower.contains("rate limit") || lower.contains("429") {
            ProviderErrorKind::RateLimited
        } else if lower.contains("overloaded") || lower.contains("503") {
            ProviderErrorKind::Overloaded
        } else if lower.contains("invalid") || lower.contains("400") {
            ProviderErrorKind::InvalidRequest
        } else if lower.contains("500") || lower.contains("internal") {
            ProviderErrorKind::Internal
        } else {
            ProviderErrorKind::Unknown
        };
        ProviderError::new(kind, msg)
    }
}

impl Default for AsyncOpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for AsyncOpenAiProvider {
    #[instrument(skip_all, fields(model = %model_name))]
    async fn invoke_model(
        &self,
        model_name: &str,
        system_prompt: &str,
        messages: &[Message],
        opts: InvokeOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model_name);
        args.messages(Self::messages_to_request(system_prompt, messages));
        if !opts.tools.is_empty() {
            args.tools(Self::tools_to_request(&opts.tools));
            args.tool_choice(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto));
        }
        if let Some(t) = opts.model_profile.temperature {
            args.temperature(t);
        }
        if let Some(t) = opts.model_profile.max_tokens {
            args.max_completion_tokens(t);
        }

        if let Some(on_chunk) = opts.on_chunk.clone() {
            args.stream(true);
            let request = args.build().map_err(Self::classify_error)?;
            debug!(message_count = messages.len(), "invoking model (stream)");
            let mut stream = self
                .client
                .chat()
                .create_stream(request)
                .await
                .map_err(Self::classify_error)?;

            let mut text = String::new();
            let mut tool_calls: std::collections::HashMap<u32, (String, String, String)> =
                std::collections::HashMap::new();
            let mut usage = Usage::default();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(Self::classify_error)?;
                if let Some(u) = chunk.usage {
                    usage.input_tokens = u.prompt_tokens as u64;
                    usage.output_tokens = u.completion_tokens as u64;
                }
                for choice in chunk.choices {
                    if let Some(delta) = choice.delta.content {
                        if !delta.is_empty() {
                            text.push_str(&delta);
                            on_chunk(&delta);
                        }
                    }
                    if let Some(deltas) = choice.delta.tool_calls {
                        for d in deltas {
                            let entry = tool_calls.entry(d.index).or_insert_with(|| {
                                (d.id.clone().unwrap_or_default(), String::new(), String::new())
                            });
                            if let Some(f) = d.function {
                                if let Some(name) = f.name {
                                    entry.1 = name;
                                }
                                if let Some(args) = f.arguments {
                                    entry.2.push_str(&args);
                                }
                            }
                        }
                    }
                }
            }

            let mut content = Vec::new();
            if !text.is_empty() {
                content.push(Block::Text { text });
            }
            let mut ordered: Vec<_> = tool_calls.into_iter().collect();
            ordered.sort_by_key(|(idx, _)| *idx);
            for (_, (id, name, arguments)) in ordered {
                let input = serde_json::from_str(&arguments).unwrap_or(serde_json::Value::Null);
                content.push(Block::NativeToolCall { id, name, input });
            }

            Ok(ProviderResponse { content, usage })
        } else {
            let request = args.build().map_err(Self::classify_error)?;
            trace!(message_count = messages.len(), "invoking model");
            let response = self
                .client
                .chat()
                .create(request)
                .await
                .map_err(Self::classify_error)?;

            let choice = response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::new(ProviderErrorKind::Internal, "no choices returned"))?;

            let mut content = Vec::new();
            if let Some(text) = choice.message.content {
                if !text.is_empty() {
                    content.push(Block::Text { text });
                }
            }
            for tc in choice.message.tool_calls.unwrap_or_default() {
                if let ChatCompletionMessageToolCalls::Function(f) = tc {
                    let input = serde_json::from_str(&f.function.arguments).unwrap_or(serde_json::Value::Null);
                    content.push(Block::NativeToolCall {
                        id: f.id,
                        name: f.function.name,
                        input,
                    });
                }
            }

            let usage = response
                .usage
                .map(|u| Usage {
                    input_tokens: u.prompt_tokens as u64,
                    output_tokens: u.completion_tokens as u64,
                    cache_write_tokens: 0,
                    cache_read_tokens: 0,
                    cost_usd: 0.0,
                })
                .unwrap_or_default();

            Ok(ProviderResponse { content, usage })
        }
    }
}
