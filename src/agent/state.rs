//! Per-agent mutable state.

use crate::agent_loop::{AgentResult, Checkpoint, EventLoopMetrics};
use crate::conversation::ConversationHistory;
use crate::hooks::InterruptRegistry;
use crate::types::StructuredOutputConfig;

/// Everything an agent remembers between invocations.
///
/// Only the cycle runner and the conversation manager mutate `history`,
/// and only while the invocation guard is held.
#[derive(Debug, Default)]
pub struct AgentState {
    pub history: ConversationHistory,
    pub metrics: EventLoopMetrics,
    pub interrupts: InterruptRegistry,
    /// Set while an invocation is suspended on interrupts.
    pub checkpoint: Option<Checkpoint>,
    /// Structured-output shadow configuration sent with every model request.
    pub structured_output: Option<StructuredOutputConfig>,
    /// Result of the last invocation that ran to completion.
    pub last_result: Option<AgentResult>,
}

impl AgentState {
    pub fn new(history: ConversationHistory) -> Self {
        Self {
            history,
            ..Default::default()
        }
    }

    /// Swap the structured-output configuration, returning the previous one.
    pub fn replace_structured_output(
        &mut self,
        config: Option<StructuredOutputConfig>,
    ) -> Option<StructuredOutputConfig> {
        std::mem::replace(&mut self.structured_output, config)
    }
}
