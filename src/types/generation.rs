//! Stop reasons and structured-output configuration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Why a model turn (or a whole invocation) stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    ContentFiltered,
    GuardrailIntervened,
    /// A hook paused the cycle; resume with interrupt responses.
    Interrupt,
}

/// Structured-output "shadow" configuration held on the agent state.
///
/// When enabled the schema travels with every model request and the final
/// text is decoded as JSON into [`crate::agent_loop::AgentResult::structured_output`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredOutputConfig {
    pub name: String,
    pub schema: serde_json::Value,
}

impl StructuredOutputConfig {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}
