//! Reduction contract shared by the history strategies.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::history::ConversationHistory;
use crate::error::OrbitError;
use crate::types::Message;

/// Why a reduction was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ReductionReason {
    /// The provider rejected the last request as too large.
    ContextWindowOverflow,
    /// The strategy's own limits were exceeded after an append.
    Proactive,
}

/// Strategy that keeps history within provider limits.
///
/// `reduce` is the single source of truth; `reduce_async` must be
/// behaviorally identical. The default async path runs `reduce` on the
/// blocking pool against a scratch copy and swaps it in on success.
pub trait ConversationManager: Send + Sync + 'static {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Whether the history should be reduced before the next model call.
    fn needs_reduction(&self, _history: &ConversationHistory) -> bool {
        false
    }

    /// Shrink the history or fail with [`OrbitError::ContextOverflow`].
    fn reduce(
        &self,
        history: &mut ConversationHistory,
        reason: ReductionReason,
    ) -> Result<(), OrbitError>;

    fn reduce_async<'a>(
        self: Arc<Self>,
        history: &'a mut ConversationHistory,
        reason: ReductionReason,
    ) -> BoxFuture<'a, Result<(), OrbitError>> {
        Box::pin(async move {
            let mut scratch = history.clone();
            let reduced = tokio::task::spawn_blocking(move || {
                self.reduce(&mut scratch, reason).map(|()| scratch)
            })
            .await
            .map_err(|err| OrbitError::InvalidState(format!("reduction task failed: {err}")))??;
            *history = reduced;
            Ok(())
        })
    }

    /// Total messages removed from history so far.
    fn removed_message_count(&self) -> usize {
        0
    }
}

/// Strategy that never reduces. Overflow is fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConversationManager;

impl ConversationManager for NullConversationManager {
    fn name(&self) -> &'static str {
        "none"
    }

    fn reduce(
        &self,
        history: &mut ConversationHistory,
        reason: ReductionReason,
    ) -> Result<(), OrbitError> {
        Err(OrbitError::ContextOverflow(format!(
            "history reduction disabled ({reason}, {} messages)",
            history.len()
        )))
    }
}

/// Strategy selector.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationStrategy {
    #[default]
    SlidingWindow,
    Summarizing,
    None,
}

pub const DEFAULT_WINDOW_SIZE: usize = 40;
pub const DEFAULT_SUMMARY_RATIO: f64 = 0.3;
pub const DEFAULT_PRESERVE_RECENT_MESSAGES: usize = 10;

/// Settings for the history strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bon::Builder)]
#[serde(default)]
pub struct ConversationManagerConfig {
    #[builder(default)]
    pub strategy: ConversationStrategy,
    #[builder(default = DEFAULT_WINDOW_SIZE)]
    pub window_size: usize,
    #[builder(default = DEFAULT_SUMMARY_RATIO)]
    pub summary_ratio: f64,
    #[builder(default = DEFAULT_PRESERVE_RECENT_MESSAGES)]
    pub preserve_recent_messages: usize,
    pub max_context_tokens: Option<usize>,
    #[builder(default = true)]
    pub truncate_tool_results: bool,
}

impl Default for ConversationManagerConfig {
    fn default() -> Self {
        Self {
            strategy: ConversationStrategy::default(),
            window_size: DEFAULT_WINDOW_SIZE,
            summary_ratio: DEFAULT_SUMMARY_RATIO,
            preserve_recent_messages: DEFAULT_PRESERVE_RECENT_MESSAGES,
            max_context_tokens: None,
            truncate_tool_results: true,
        }
    }
}

/// First index at or after `start` where history may begin without
/// orphaning a tool exchange.
///
/// A valid start is neither a tool-result message nor a tool-use message
/// whose results do not immediately follow. Returns `None` when no such index
/// exists before the end.
pub fn next_valid_cut(messages: &[Message], start: usize) -> Option<usize> {
    let mut cut = start;
    while cut < messages.len() {
        let message = &messages[cut];
        let orphaned_result = message.has_tool_result();
        let dangling_use = message.has_tool_use()
            && cut + 1 < messages.len()
            && !messages[cut + 1].has_tool_result();
        if orphaned_result || dangling_use {
            cut += 1;
        } else {
            return Some(cut);
        }
    }
    None
}
