//! Lifecycle events emitted while a cycle runs.

use std::sync::Arc;

use crate::hooks::Interrupt;
use crate::types::{Message, StopReason, ToolResult, ToolUse};

use super::metrics::ToolOutcome;
use super::types::AgentResult;

/// Event observed by [`crate::agent::Agent::stream`] consumers, in the
/// causal order of the cycle state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    InvocationStarted,
    /// A suspended invocation re-entered `stage` after a resume.
    InvocationResumed {
        cycle: usize,
        stage: &'static str,
    },
    CycleStarted {
        cycle: usize,
    },
    /// Incremental assistant text as the model streams it.
    TextDelta {
        text: String,
    },
    ModelResponded {
        cycle: usize,
        stop_reason: StopReason,
    },
    MessageAdded {
        index: usize,
        message: Message,
    },
    ToolStarted {
        tool_use: ToolUse,
    },
    ToolCompleted {
        tool_name: String,
        result: ToolResult,
        outcome: ToolOutcome,
    },
    ContextReduced {
        strategy: &'static str,
        tokens_before: usize,
        tokens_after: usize,
    },
    Interrupted {
        interrupts: Vec<Interrupt>,
    },
    /// Terminal event of a stream.
    Finished(Box<AgentResult>),
}

/// Sink for loop events.
pub type LoopEventSink = Arc<dyn Fn(LoopEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct LoopEventEmitter {
    sink: Option<LoopEventSink>,
}

impl LoopEventEmitter {
    pub(crate) fn new(sink: Option<LoopEventSink>) -> Self {
        Self { sink }
    }

    pub(crate) fn emit(&self, event: LoopEvent) {
        if let Some(sink) = &self.sink {
            sink(event);
        }
    }
}
