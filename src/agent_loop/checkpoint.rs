//! Serializable snapshot of a suspended cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OrbitError;
use crate::hooks::Interrupt;
use crate::provider::ModelResponse;
use crate::types::{Message, StopReason, ToolResult, ToolUse};

use super::metrics::ToolOutcome;

/// Where the cycle state machine stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum LoopStage {
    /// Before-invocation hooks pending; `prompt` is appended once they pass.
    BeforeInvocation { prompt: Vec<Message> },
    AwaitingModel,
    /// A model response awaiting after-model-call hooks and append.
    ProcessingContent { response: ModelResponse },
    /// Message-added hooks pending for the message at `index`.
    MessageAdded {
        index: usize,
        then: Box<LoopStage>,
    },
    ExecutingTools { tools: Vec<ToolProgress> },
    Finished {
        stop_reason: StopReason,
        message: Message,
    },
}

impl LoopStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BeforeInvocation { .. } => "before_invocation",
            Self::AwaitingModel => "awaiting_model",
            Self::ProcessingContent { .. } => "processing_content",
            Self::MessageAdded { .. } => "message_added",
            Self::ExecutingTools { .. } => "executing_tools",
            Self::Finished { .. } => "finished",
        }
    }
}

/// Progress of one requested tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ToolState {
    /// Before-tool-call hooks have not let it through yet.
    Pending,
    /// Finished running; after-tool-call hooks still pending.
    Executed {
        result: ToolResult,
        outcome: ToolOutcome,
        return_direct: bool,
    },
    Completed {
        result: ToolResult,
        outcome: ToolOutcome,
        return_direct: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProgress {
    pub tool_use: ToolUse,
    pub state: ToolState,
}

impl ToolProgress {
    pub fn pending(tool_use: ToolUse) -> Self {
        Self {
            tool_use,
            state: ToolState::Pending,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, ToolState::Completed { .. })
    }
}

/// Everything needed to resume a suspended invocation, possibly on another
/// agent instance loaded with the same history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Invocation the pending interrupt identities belong to.
    pub invocation_id: String,
    pub cycle: usize,
    pub stage: LoopStage,
    pub interrupts: Vec<Interrupt>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        invocation_id: impl Into<String>,
        cycle: usize,
        stage: LoopStage,
        interrupts: Vec<Interrupt>,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            cycle,
            stage,
            interrupts,
            created_at: Utc::now(),
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value, OrbitError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, OrbitError> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn checkpoint_survives_json() {
        let checkpoint = Checkpoint::new(
            "inv-1",
            2,
            LoopStage::MessageAdded {
                index: 5,
                then: Box::new(LoopStage::ExecutingTools {
                    tools: vec![
                        ToolProgress::pending(ToolUse::new("a", "x", serde_json::json!({}))),
                        ToolProgress {
                            tool_use: ToolUse::new("b", "y", serde_json::json!({"n": 1})),
                            state: ToolState::Executed {
                                result: ToolResult::error("b", "boom"),
                                outcome: ToolOutcome::Error,
                                return_direct: false,
                            },
                        },
                    ],
                }),
            },
            vec![Interrupt {
                id: "i1".into(),
                name: "approval".into(),
                reason: serde_json::json!({"tool": "y"}),
                response: None,
            }],
        );

        let value = checkpoint.to_value().unwrap();
        assert_eq!(value["stage"]["stage"], "message_added");
        assert_eq!(value["invocation_id"], "inv-1");
        assert_eq!(Checkpoint::from_value(value).unwrap(), checkpoint);
    }
}
