//! Lifecycle events delivered to hook handlers.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::provider::ModelResponse;
use crate::types::{Message, StopReason, ToolResult, ToolUse};

/// Lifecycle stage a hook event belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HookStage {
    AgentInitialized,
    BeforeInvocation,
    AfterInvocation,
    MessageAdded,
    BeforeModelCall,
    AfterModelCall,
    BeforeToolCall,
    AfterToolCall,
}

impl HookStage {
    /// Whether handlers at this stage may pause the cycle.
    pub fn is_interruptible(self) -> bool {
        !matches!(self, Self::AgentInitialized | Self::AfterInvocation)
    }
}

/// One lifecycle notification.
///
/// Tool events carry mutable payloads: a before-tool-call handler may rewrite
/// `tool_use.input`, an after-tool-call handler may replace `result`.
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    AgentInitialized,
    BeforeInvocation {
        messages: Vec<Message>,
    },
    AfterInvocation {
        stop_reason: Option<StopReason>,
    },
    MessageAdded {
        index: usize,
        message: Message,
    },
    BeforeModelCall {
        message_count: usize,
    },
    AfterModelCall {
        response: ModelResponse,
    },
    BeforeToolCall {
        tool_use: ToolUse,
    },
    AfterToolCall {
        tool_use: ToolUse,
        result: ToolResult,
    },
}

impl HookEvent {
    pub fn stage(&self) -> HookStage {
        match self {
            Self::AgentInitialized => HookStage::AgentInitialized,
            Self::BeforeInvocation { .. } => HookStage::BeforeInvocation,
            Self::AfterInvocation { .. } => HookStage::AfterInvocation,
            Self::MessageAdded { .. } => HookStage::MessageAdded,
            Self::BeforeModelCall { .. } => HookStage::BeforeModelCall,
            Self::AfterModelCall { .. } => HookStage::AfterModelCall,
            Self::BeforeToolCall { .. } => HookStage::BeforeToolCall,
            Self::AfterToolCall { .. } => HookStage::AfterToolCall,
        }
    }

    /// Stage-local discriminator used in interrupt identities.
    pub fn discriminator(&self) -> String {
        match self {
            Self::BeforeToolCall { tool_use } | Self::AfterToolCall { tool_use, .. } => {
                tool_use.id.clone()
            }
            Self::MessageAdded { index, .. } => index.to_string(),
            _ => String::new(),
        }
    }

    /// Key identifying this occurrence of the event: the invocation, the
    /// cycle within it and the stage-local discriminator.
    pub fn interrupt_key(&self, invocation_id: &str, cycle: usize) -> String {
        format!(
            "{invocation_id}:{}:{cycle}:{}",
            self.stage(),
            self.discriminator()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_key_uses_invocation_cycle_and_discriminator() {
        let event = HookEvent::BeforeToolCall {
            tool_use: ToolUse::new("tool-7", "search", serde_json::json!({})),
        };
        assert_eq!(event.interrupt_key("inv-1", 3), "inv-1:before_tool_call:3:tool-7");
        assert_ne!(event.interrupt_key("inv-1", 3), event.interrupt_key("inv-2", 3));

        let added = HookEvent::MessageAdded {
            index: 4,
            message: Message::user("hi"),
        };
        assert_eq!(added.interrupt_key("inv-1", 0), "inv-1:message_added:0:4");
    }

    #[test]
    fn notification_only_stages() {
        assert!(!HookStage::AgentInitialized.is_interruptible());
        assert!(!HookStage::AfterInvocation.is_interruptible());
        assert!(HookStage::AfterToolCall.is_interruptible());
    }
}
