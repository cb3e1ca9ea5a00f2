//! Conversation history and context-size management.

pub mod estimate;
pub mod history;
pub mod manager;
pub mod sliding_window;
pub mod summarizing;

use std::sync::Arc;

pub use estimate::{estimate_message_chars, estimate_tokens};
pub use history::ConversationHistory;
pub use manager::{
    next_valid_cut, ConversationManager, ConversationManagerConfig, ConversationStrategy,
    NullConversationManager, ReductionReason,
};
pub use sliding_window::SlidingWindowConversationManager;
pub use summarizing::{Summarizer, SummarizingConversationManager};

/// Build the strategy a config selects.
///
/// `summarizer` is only consulted for [`ConversationStrategy::Summarizing`].
pub fn manager_from_config(
    config: &ConversationManagerConfig,
    summarizer: impl FnOnce() -> Summarizer,
) -> Arc<dyn ConversationManager> {
    match config.strategy {
        ConversationStrategy::SlidingWindow => Arc::new(
            SlidingWindowConversationManager::new(config.window_size)
                .with_max_context_tokens(config.max_context_tokens)
                .with_truncate_tool_results(config.truncate_tool_results),
        ),
        ConversationStrategy::Summarizing => Arc::new(SummarizingConversationManager::from_config(
            summarizer(),
            config,
        )),
        ConversationStrategy::None => Arc::new(NullConversationManager),
    }
}
