//! Model provider boundary.
//!
//! Request formatting and transport belong to the provider implementation;
//! the loop only sees messages in, content blocks out.

pub mod stream;

pub use stream::{ModelStreamEvent, StreamAccumulator};

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::OrbitError;
use crate::tools::ToolSpec;
use crate::types::{ContentBlock, Message, StopReason, StructuredOutputConfig, Usage};

/// A request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolSpec>,
    pub structured_output: Option<StructuredOutputConfig>,
}

impl ModelRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_structured_output(mut self, config: Option<StructuredOutputConfig>) -> Self {
        self.structured_output = config;
        self
    }
}

/// A complete model turn.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    #[serde(default)]
    pub usage: Usage,
}

impl ModelResponse {
    pub fn new(content: Vec<ContentBlock>, stop_reason: StopReason) -> Self {
        Self {
            content,
            stop_reason,
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse(_)))
    }
}

/// Core trait implemented by model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "bedrock", "scripted").
    fn provider_name(&self) -> &str;

    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// Produce one complete turn.
    ///
    /// A provider that rejects the request for size must report
    /// [`OrbitError::ContextWindowOverflow`] so the loop can reduce and retry.
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, OrbitError>;

    /// Produce one turn incrementally. The default replays [`Self::generate`].
    async fn stream(
        &self,
        request: &ModelRequest,
    ) -> Result<BoxStream<'static, Result<ModelStreamEvent, OrbitError>>, OrbitError> {
        let response = self.generate(request).await?;
        let events = stream::events_from_response(response);
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }
}
