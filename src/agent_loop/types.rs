//! Result of an agent invocation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::OrbitError;
use crate::hooks::Interrupt;
use crate::types::{ContentBlock, Message, StopReason};

use super::checkpoint::Checkpoint;
use super::metrics::{EventLoopMetrics, ToolExecutionRecord};

const AGENT_RESULT_TYPE: &str = "agent_result";
const CODE_INTERPRETER_TOOL: &str = "code_interpreter";
const EXECUTED_CODE_POINTER: &str = "/code_interpreter_input/action/code";

/// Per-tool view of the calls recorded in [`EventLoopMetrics`], carrying the
/// most recent call's identity and input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionSummary {
    pub name: String,
    pub tool_use_id: String,
    pub input: serde_json::Value,
    pub call_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_duration_ms: u64,
}

/// Outcome of [`crate::agent::Agent::invoke`] and friends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub stop_reason: StopReason,
    /// Final message; empty for interrupted invocations.
    pub message: Message,
    /// Snapshot of the agent's metrics when the invocation stopped.
    #[serde(default)]
    pub metrics: EventLoopMetrics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interrupts: Vec<Interrupt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<serde_json::Value>,
}

impl AgentResult {
    pub fn new(stop_reason: StopReason, message: Message, metrics: EventLoopMetrics) -> Self {
        Self {
            stop_reason,
            message,
            metrics,
            interrupts: Vec::new(),
            checkpoint: None,
            structured_output: None,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.stop_reason == StopReason::Interrupt
    }

    /// One summary per tool that ran, ordered by tool name.
    pub fn tool_executions(&self) -> Vec<ToolExecutionSummary> {
        self.metrics
            .tool_metrics
            .iter()
            .filter_map(|(name, stats)| {
                let latest = self.latest_record(name)?;
                Some(ToolExecutionSummary {
                    name: name.clone(),
                    tool_use_id: latest.tool_use_id.clone(),
                    input: latest.input.clone(),
                    call_count: stats.call_count,
                    success_count: stats.success_count,
                    error_count: stats.error_count,
                    total_duration_ms: stats.total_duration_ms,
                })
            })
            .collect()
    }

    /// Input of the most recent call of each tool, keyed by tool name.
    pub fn tool_inputs(&self) -> BTreeMap<String, serde_json::Value> {
        let mut inputs = BTreeMap::new();
        for record in &self.metrics.tool_records {
            inputs.insert(record.tool_name.clone(), record.input.clone());
        }
        inputs
    }

    /// Code sent to the code-interpreter tool by its most recent call.
    ///
    /// `None` when that tool never ran or its input has no code action.
    pub fn executed_code(&self) -> Option<String> {
        self.latest_record(CODE_INTERPRETER_TOOL)?
            .input
            .pointer(EXECUTED_CODE_POINTER)?
            .as_str()
            .map(str::to_string)
    }

    fn latest_record(&self, tool_name: &str) -> Option<&ToolExecutionRecord> {
        self.metrics
            .tool_records
            .iter()
            .rev()
            .find(|record| record.tool_name == tool_name)
    }

    /// Minimal tagged representation: type, message and stop reason.
    pub fn to_value(&self) -> Result<serde_json::Value, OrbitError> {
        Ok(serde_json::json!({
            "type": AGENT_RESULT_TYPE,
            "message": serde_json::to_value(&self.message)?,
            "stop_reason": serde_json::to_value(self.stop_reason)?,
        }))
    }

    /// Rebuild from [`Self::to_value`] output. Metrics start empty.
    pub fn from_value(value: serde_json::Value) -> Result<Self, OrbitError> {
        let kind = value.get("type").and_then(|v| v.as_str());
        if kind != Some(AGENT_RESULT_TYPE) {
            return Err(OrbitError::InvalidArgument(format!(
                "expected type '{AGENT_RESULT_TYPE}', got {kind:?}"
            )));
        }
        let message = value
            .get("message")
            .cloned()
            .ok_or_else(|| OrbitError::InvalidArgument("missing 'message'".into()))?;
        let stop_reason = value
            .get("stop_reason")
            .cloned()
            .ok_or_else(|| OrbitError::InvalidArgument("missing 'stop_reason'".into()))?;
        Ok(Self::new(
            serde_json::from_value(stop_reason)?,
            serde_json::from_value(message)?,
            EventLoopMetrics::default(),
        ))
    }
}

impl fmt::Display for AgentResult {
    /// Each text block (or tool result, for return-direct results) on its
    /// own line; structured output when there is no text.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        for block in &self.message.content {
            match block {
                ContentBlock::Text(text) => writeln!(f, "{text}")?,
                ContentBlock::ToolResult(result) => writeln!(f, "{}", result.text())?,
                _ => continue,
            }
            wrote = true;
        }
        if !wrote {
            if let Some(output) = &self.structured_output {
                write!(f, "{output}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_loop::metrics::ToolOutcome;
    use crate::types::{Role, ToolUse};
    use pretty_assertions::assert_eq;

    #[test]
    fn display_joins_text_blocks_with_newlines() {
        let result = AgentResult::new(
            StopReason::EndTurn,
            Message::new(
                Role::Assistant,
                vec![
                    ContentBlock::text("first"),
                    ContentBlock::ToolUse(ToolUse::new("t", "x", serde_json::json!({}))),
                    ContentBlock::text("second"),
                ],
            ),
            EventLoopMetrics::default(),
        );
        assert_eq!(result.to_string(), "first\nsecond\n");
    }

    #[test]
    fn display_falls_back_to_structured_output() {
        let mut result = AgentResult::new(
            StopReason::EndTurn,
            Message::new(Role::Assistant, vec![]),
            EventLoopMetrics::default(),
        );
        result.structured_output = Some(serde_json::json!({"ok": true}));
        assert_eq!(result.to_string(), "{\"ok\":true}");
    }

    fn record(
        name: &str,
        id: &str,
        input: serde_json::Value,
        outcome: ToolOutcome,
    ) -> ToolExecutionRecord {
        ToolExecutionRecord {
            tool_name: name.into(),
            tool_use_id: id.into(),
            input,
            duration_ms: 5,
            outcome,
            finished_at: chrono::Utc::now(),
        }
    }

    fn result_with(records: Vec<ToolExecutionRecord>) -> AgentResult {
        let mut metrics = EventLoopMetrics::default();
        for record in records {
            metrics.record_tool(record);
        }
        AgentResult::new(StopReason::EndTurn, Message::assistant("done"), metrics)
    }

    #[test]
    fn tool_executions_summarize_each_tool() {
        let code = serde_json::json!({
            "code_interpreter_input": {
                "action": {"type": "executeCode", "language": "python", "code": "print('hi')"}
            }
        });
        let result = result_with(vec![
            record(
                "calculator",
                "tool_1",
                serde_json::json!({"expression": "5 + 3"}),
                ToolOutcome::Success,
            ),
            record("code_interpreter", "tool_2", code.clone(), ToolOutcome::Error),
            record("code_interpreter", "tool_3", code.clone(), ToolOutcome::Success),
        ]);

        let executions = result.tool_executions();
        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].name, "calculator");
        assert_eq!(executions[0].input, serde_json::json!({"expression": "5 + 3"}));
        assert_eq!(executions[0].call_count, 1);
        assert_eq!(executions[1].tool_use_id, "tool_3");
        assert_eq!(executions[1].call_count, 2);
        assert_eq!(executions[1].success_count, 1);
        assert_eq!(executions[1].error_count, 1);
        assert_eq!(executions[1].total_duration_ms, 10);

        let inputs = result.tool_inputs();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs["calculator"], serde_json::json!({"expression": "5 + 3"}));
        assert_eq!(result.executed_code().as_deref(), Some("print('hi')"));
    }

    #[test]
    fn tool_helpers_are_empty_without_tool_calls() {
        let result = result_with(vec![]);
        assert!(result.tool_executions().is_empty());
        assert!(result.tool_inputs().is_empty());
        assert_eq!(result.executed_code(), None);
    }

    #[test]
    fn executed_code_ignores_other_tools_and_malformed_input() {
        let other = result_with(vec![record(
            "calculator",
            "tool_1",
            serde_json::json!({"expression": "1"}),
            ToolOutcome::Success,
        )]);
        assert_eq!(other.executed_code(), None);

        let malformed = result_with(vec![record(
            "code_interpreter",
            "tool_9",
            serde_json::json!({"malformed": "structure"}),
            ToolOutcome::Success,
        )]);
        assert_eq!(malformed.executed_code(), None);
    }

    #[test]
    fn tagged_value_round_trip() {
        let result = AgentResult::new(
            StopReason::EndTurn,
            Message::assistant("done"),
            EventLoopMetrics::default(),
        );
        let value = result.to_value().unwrap();
        assert_eq!(value["type"], "agent_result");
        assert_eq!(value["stop_reason"], "end_turn");
        assert_eq!(AgentResult::from_value(value).unwrap(), result);

        let err = AgentResult::from_value(serde_json::json!({"type": "other"})).unwrap_err();
        assert!(matches!(err, OrbitError::InvalidArgument(_)));
    }
}
