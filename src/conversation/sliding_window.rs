//! Sliding-window reduction: keep the most recent messages.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::estimate::estimate_tokens;
use super::history::ConversationHistory;
use super::manager::{next_valid_cut, ConversationManager, ReductionReason, DEFAULT_WINDOW_SIZE};
use crate::error::OrbitError;
use crate::types::{ContentBlock, ToolResultContent, ToolResultStatus};

/// Placeholder swapped in for oversized tool output.
pub const TOOL_RESULT_TOO_LARGE: &str = "The tool result was too large!";

/// Smallest cut tried when the window itself is not exceeded.
const MIN_OVERFLOW_CUT: usize = 2;

#[derive(Debug)]
pub struct SlidingWindowConversationManager {
    window_size: usize,
    max_context_tokens: Option<usize>,
    truncate_tool_results: bool,
    removed: AtomicUsize,
}

impl Default for SlidingWindowConversationManager {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl SlidingWindowConversationManager {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            max_context_tokens: None,
            truncate_tool_results: true,
            removed: AtomicUsize::new(0),
        }
    }

    pub fn with_max_context_tokens(mut self, max_context_tokens: Option<usize>) -> Self {
        self.max_context_tokens = max_context_tokens;
        self
    }

    pub fn with_truncate_tool_results(mut self, truncate: bool) -> Self {
        self.truncate_tool_results = truncate;
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    fn exceeds_token_budget(&self, tokens: usize) -> bool {
        self.max_context_tokens.is_some_and(|max| tokens > max)
    }

    /// Replace the results in the newest tool-result message with a short
    /// placeholder. Returns false when there is nothing left to shrink or the
    /// placeholder would not make the message smaller.
    fn truncate_latest_tool_results(history: &mut ConversationHistory) -> bool {
        let Some(index) = history
            .messages()
            .iter()
            .rposition(|message| message.has_tool_result())
        else {
            return false;
        };

        let original = &history.messages()[index];
        let mut truncated = original.clone();
        for block in &mut truncated.content {
            let ContentBlock::ToolResult(result) = block else {
                continue;
            };
            let already_truncated = result.status == ToolResultStatus::Error
                && result.text() == TOOL_RESULT_TOO_LARGE;
            if already_truncated {
                return false;
            }
            result.status = ToolResultStatus::Error;
            result.content = vec![ToolResultContent::Text(TOOL_RESULT_TOO_LARGE.into())];
        }
        if estimate_tokens(std::slice::from_ref(&truncated))
            >= estimate_tokens(std::slice::from_ref(original))
        {
            return false;
        }

        history.update(|messages| messages[index] = truncated);
        true
    }

    /// Index of the first message to keep.
    fn find_cut(&self, history: &ConversationHistory) -> Result<usize, OrbitError> {
        let messages = history.messages();
        let start = if messages.len() > self.window_size {
            messages.len() - self.window_size
        } else {
            MIN_OVERFLOW_CUT
        };

        let unable = || {
            OrbitError::ContextOverflow(format!(
                "unable to trim conversation context ({} messages, window {})",
                messages.len(),
                self.window_size
            ))
        };

        let mut cut = next_valid_cut(messages, start).ok_or_else(unable)?;
        while self.exceeds_token_budget(estimate_tokens(&messages[cut..])) {
            cut = next_valid_cut(messages, cut + 1).ok_or_else(unable)?;
        }
        Ok(cut)
    }
}

impl ConversationManager for SlidingWindowConversationManager {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    fn needs_reduction(&self, history: &ConversationHistory) -> bool {
        history.len() > self.window_size || self.exceeds_token_budget(history.token_estimate())
    }

    fn reduce(
        &self,
        history: &mut ConversationHistory,
        reason: ReductionReason,
    ) -> Result<(), OrbitError> {
        if reason == ReductionReason::ContextWindowOverflow
            && self.truncate_tool_results
            && Self::truncate_latest_tool_results(history)
        {
            tracing::debug!(strategy = self.name(), "truncated oversized tool results");
            return Ok(());
        }

        let cut = self.find_cut(history)?;
        history.drain_front(cut);
        self.removed.fetch_add(cut, Ordering::Relaxed);
        tracing::debug!(
            strategy = self.name(),
            %reason,
            removed = cut,
            remaining = history.len(),
            tokens = history.token_estimate(),
            "trimmed conversation history"
        );
        Ok(())
    }

    fn removed_message_count(&self) -> usize {
        self.removed.load(Ordering::Relaxed)
    }
}
