//! Summarizing reduction: replace the oldest messages with a model-written summary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use super::estimate::estimate_tokens;
use super::history::ConversationHistory;
use super::manager::{
    next_valid_cut, ConversationManager, ConversationManagerConfig, ReductionReason,
};
use super::sliding_window::SlidingWindowConversationManager;
use crate::agent::Agent;
use crate::error::OrbitError;
use crate::provider::{ModelProvider, ModelRequest};
use crate::types::{ContentBlock, Message, Role};

const MIN_SUMMARY_RATIO: f64 = 0.1;
const MAX_SUMMARY_RATIO: f64 = 0.8;

/// Inserted when the summarizer produced nothing but tool calls.
pub const SUMMARY_FALLBACK_TEXT: &str =
    "Earlier conversation was condensed, but no summary text was produced.";

/// Final user turn appended to the messages being summarized.
pub const SUMMARIZE_REQUEST: &str = "Please summarize this conversation.";

pub const DEFAULT_SUMMARIZATION_PROMPT: &str = "You are summarizing an earlier part of a \
conversation between a user and an assistant so it can continue within a limited context. \
Write a concise summary in bullet points, from the assistant's perspective. Keep every fact, \
decision, file name, identifier and tool outcome the assistant will need later, and describe \
tool calls in prose instead of repeating them. Do not answer any open request; only summarize.";

/// Who writes the summary.
#[derive(Clone)]
pub enum Summarizer {
    /// Call a model directly with the summarization prompt as system prompt.
    Model(Arc<dyn ModelProvider>),
    /// Run a dedicated agent over the prefix. Its history and structured
    /// output setting are restored after the call.
    Agent(Arc<Agent>),
}

impl Summarizer {
    async fn summarize(&self, prefix: Vec<Message>, prompt: &str) -> Result<Message, OrbitError> {
        match self {
            Self::Model(model) => {
                let mut messages = prefix;
                messages.push(Message::user(SUMMARIZE_REQUEST));
                let request =
                    ModelRequest::new(messages).with_system_prompt(Some(prompt.to_string()));
                let response = model.generate(&request).await?;
                Ok(Message::new(Role::Assistant, response.content))
            }
            Self::Agent(agent) => agent.summarize(prefix, SUMMARIZE_REQUEST, prompt).await,
        }
    }
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model(model) => write!(f, "Summarizer::Model({})", model.model_id()),
            Self::Agent(_) => f.write_str("Summarizer::Agent"),
        }
    }
}

/// Turn the summarizer's reply into a user-role history message.
///
/// User messages never carry tool-use content, so those blocks are dropped.
pub fn summary_message(raw: Message) -> Message {
    let content: Vec<ContentBlock> = raw
        .content
        .into_iter()
        .filter(|block| !matches!(block, ContentBlock::ToolUse(_)))
        .collect();
    if content.is_empty() {
        Message::user(SUMMARY_FALLBACK_TEXT)
    } else {
        Message::new(Role::User, content)
    }
}

#[derive(Debug)]
pub struct SummarizingConversationManager {
    summarizer: Summarizer,
    summary_ratio: f64,
    preserve_recent_messages: usize,
    max_context_tokens: Option<usize>,
    prompt: String,
    fallback: SlidingWindowConversationManager,
    summary: Mutex<Option<Message>>,
    removed: AtomicUsize,
}

impl SummarizingConversationManager {
    pub fn new(summarizer: Summarizer) -> Self {
        Self::from_config(summarizer, &ConversationManagerConfig::default())
    }

    pub fn from_config(summarizer: Summarizer, config: &ConversationManagerConfig) -> Self {
        Self {
            summarizer,
            summary_ratio: config.summary_ratio.clamp(MIN_SUMMARY_RATIO, MAX_SUMMARY_RATIO),
            preserve_recent_messages: config.preserve_recent_messages,
            max_context_tokens: config.max_context_tokens,
            prompt: DEFAULT_SUMMARIZATION_PROMPT.to_string(),
            fallback: SlidingWindowConversationManager::new(config.window_size)
                .with_max_context_tokens(config.max_context_tokens)
                .with_truncate_tool_results(config.truncate_tool_results),
            summary: Mutex::new(None),
            removed: AtomicUsize::new(0),
        }
    }

    pub fn with_summary_ratio(mut self, ratio: f64) -> Self {
        self.summary_ratio = ratio.clamp(MIN_SUMMARY_RATIO, MAX_SUMMARY_RATIO);
        self
    }

    pub fn with_preserve_recent_messages(mut self, count: usize) -> Self {
        self.preserve_recent_messages = count;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn summary_ratio(&self) -> f64 {
        self.summary_ratio
    }

    /// The summary message currently at the head of history, if any.
    pub fn current_summary(&self) -> Option<Message> {
        self.summary.lock().ok().and_then(|guard| guard.clone())
    }

    fn split_point(&self, messages: &[Message]) -> Result<usize, OrbitError> {
        let len = messages.len();
        let by_ratio = ((len as f64) * self.summary_ratio) as usize;
        let count = by_ratio
            .max(1)
            .min(len.saturating_sub(self.preserve_recent_messages));
        if count == 0 {
            return Err(OrbitError::ContextOverflow(
                "insufficient messages for summarization".into(),
            ));
        }
        next_valid_cut(messages, count).ok_or_else(|| {
            OrbitError::ContextOverflow("no valid split point for summarization".into())
        })
    }

    async fn summarize_prefix(&self, history: &mut ConversationHistory) -> Result<(), OrbitError> {
        let split = self.split_point(history.messages())?;
        let prefix = history.messages()[..split].to_vec();

        let raw = self.summarizer.summarize(prefix, &self.prompt).await?;
        if raw.content.is_empty() {
            return Err(OrbitError::InvalidState(
                "summarizer returned an empty response".into(),
            ));
        }
        let summary = summary_message(raw);

        let mut next = Vec::with_capacity(history.len() - split + 1);
        next.push(summary.clone());
        next.extend_from_slice(&history.messages()[split..]);
        if estimate_tokens(&next) >= history.token_estimate() {
            return Err(OrbitError::ContextOverflow(
                "summary did not reduce the context size".into(),
            ));
        }

        let mut previous = self
            .summary
            .lock()
            .map_err(|_| OrbitError::InvalidState("summary state poisoned".into()))?;
        // A prior summary sits at index 0 and was folded into this one.
        let replaced_prior = previous.is_some() && history.get(0) == previous.as_ref();
        let removed = split - usize::from(replaced_prior);
        *previous = Some(summary);
        drop(previous);

        history.replace(next);
        self.removed
            .fetch_add(removed, Ordering::Relaxed);
        tracing::debug!(
            strategy = self.name(),
            summarized = split,
            remaining = history.len(),
            tokens = history.token_estimate(),
            "summarized conversation prefix"
        );
        Ok(())
    }

    async fn reduce_with_fallback(
        &self,
        history: &mut ConversationHistory,
        reason: ReductionReason,
    ) -> Result<(), OrbitError> {
        match self.summarize_prefix(history).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "summarization failed, falling back to sliding window"
                );
                self.fallback.reduce(history, reason)
            }
        }
    }
}

impl ConversationManager for SummarizingConversationManager {
    fn name(&self) -> &'static str {
        "summarizing"
    }

    fn needs_reduction(&self, history: &ConversationHistory) -> bool {
        self.max_context_tokens
            .is_some_and(|max| history.token_estimate() > max)
    }

    fn reduce(
        &self,
        history: &mut ConversationHistory,
        reason: ReductionReason,
    ) -> Result<(), OrbitError> {
        futures::executor::block_on(self.reduce_with_fallback(history, reason))
    }

    fn reduce_async<'a>(
        self: Arc<Self>,
        history: &'a mut ConversationHistory,
        reason: ReductionReason,
    ) -> BoxFuture<'a, Result<(), OrbitError>> {
        Box::pin(async move { self.reduce_with_fallback(history, reason).await })
    }

    fn removed_message_count(&self) -> usize {
        self.removed.load(Ordering::Relaxed)
            + self.fallback.removed_message_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolUse;
    use pretty_assertions::assert_eq;

    #[test]
    fn tool_use_blocks_are_stripped_from_summaries() {
        let raw = Message::new(
            Role::Assistant,
            vec![
                ContentBlock::text("The user asked about weather."),
                ContentBlock::ToolUse(ToolUse::new("t1", "weather", serde_json::json!({}))),
            ],
        );
        let summary = summary_message(raw);
        assert_eq!(summary.role, Role::User);
        assert_eq!(
            summary.content,
            vec![ContentBlock::text("The user asked about weather.")]
        );
    }

    #[test]
    fn tool_use_only_summary_gets_fallback_text() {
        let raw = Message::new(
            Role::Assistant,
            vec![ContentBlock::ToolUse(ToolUse::new("t1", "x", serde_json::json!({})))],
        );
        assert_eq!(summary_message(raw).text(), SUMMARY_FALLBACK_TEXT);
    }
}
