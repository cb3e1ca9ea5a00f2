//! Execution metrics accumulated over an agent's lifetime.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::types::Usage;

/// How a single tool call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolOutcome {
    Success,
    Error,
    UnknownTool,
    Cancelled,
}

impl ToolOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// One tool call as it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub tool_name: String,
    pub tool_use_id: String,
    pub input: serde_json::Value,
    pub duration_ms: u64,
    pub outcome: ToolOutcome,
    pub finished_at: DateTime<Utc>,
}

/// Per-tool execution statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMetrics {
    pub call_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// Cumulative duration of all calls.
    pub total_duration_ms: u64,
}

impl ToolMetrics {
    pub fn average_duration_ms(&self) -> Option<f64> {
        if self.call_count == 0 {
            return None;
        }
        Some(self.total_duration_ms as f64 / self.call_count as f64)
    }

    /// Success rate between 0.0 and 1.0; 1.0 when nothing was recorded.
    pub fn success_rate(&self) -> f64 {
        if self.call_count == 0 {
            return 1.0;
        }
        self.success_count as f64 / self.call_count as f64
    }
}

/// Loop-level metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLoopMetrics {
    pub cycle_count: u64,
    pub cycle_durations_ms: Vec<u64>,
    pub accumulated_usage: Usage,
    pub tool_metrics: BTreeMap<String, ToolMetrics>,
    pub tool_records: Vec<ToolExecutionRecord>,
    /// Token estimate of the history after the latest mutation.
    pub latest_context_tokens: usize,
    pub reduction_count: u64,
}

impl EventLoopMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&mut self, duration: Duration) {
        self.cycle_count += 1;
        self.cycle_durations_ms.push(duration.as_millis() as u64);
    }

    pub fn record_usage(&mut self, usage: &Usage) {
        self.accumulated_usage.merge(usage);
    }

    pub fn record_tool(&mut self, record: ToolExecutionRecord) {
        let metrics = self.tool_metrics.entry(record.tool_name.clone()).or_default();
        metrics.call_count += 1;
        if record.outcome.is_success() {
            metrics.success_count += 1;
        } else {
            metrics.error_count += 1;
        }
        metrics.total_duration_ms += record.duration_ms;
        self.tool_records.push(record);
    }

    pub fn update_context_size(&mut self, tokens: usize) {
        self.latest_context_tokens = tokens;
    }

    pub fn record_reduction(&mut self) {
        self.reduction_count += 1;
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.cycle_durations_ms.iter().sum()
    }

    /// JSON summary for logs and reports.
    pub fn summary(&self) -> serde_json::Value {
        let tools: serde_json::Map<String, serde_json::Value> = self
            .tool_metrics
            .iter()
            .map(|(name, metrics)| {
                (
                    name.clone(),
                    serde_json::json!({
                        "call_count": metrics.call_count,
                        "success_count": metrics.success_count,
                        "error_count": metrics.error_count,
                        "total_duration_ms": metrics.total_duration_ms,
                        "average_duration_ms": metrics.average_duration_ms(),
                        "success_rate": metrics.success_rate(),
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "total_cycles": self.cycle_count,
            "total_duration_ms": self.total_duration_ms(),
            "average_cycle_ms": if self.cycle_count == 0 {
                0.0
            } else {
                self.total_duration_ms() as f64 / self.cycle_count as f64
            },
            "accumulated_usage": self.accumulated_usage,
            "tool_usage": tools,
            "latest_context_tokens": self.latest_context_tokens,
            "reductions": self.reduction_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, outcome: ToolOutcome, ms: u64) -> ToolExecutionRecord {
        ToolExecutionRecord {
            tool_name: name.into(),
            tool_use_id: format!("{name}-{ms}"),
            input: serde_json::json!({}),
            duration_ms: ms,
            outcome,
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn tool_records_aggregate_per_tool() {
        let mut metrics = EventLoopMetrics::new();
        metrics.record_tool(record("search", ToolOutcome::Success, 10));
        metrics.record_tool(record("search", ToolOutcome::Error, 30));
        metrics.record_tool(record("calc", ToolOutcome::UnknownTool, 0));

        let search = &metrics.tool_metrics["search"];
        assert_eq!(search.call_count, 2);
        assert_eq!(search.error_count, 1);
        assert_eq!(search.total_duration_ms, 40);
        assert_eq!(search.average_duration_ms(), Some(20.0));
        assert_eq!(search.success_rate(), 0.5);
        assert_eq!(metrics.tool_records.len(), 3);
    }

    #[test]
    fn summary_includes_cycles_usage_and_context() {
        let mut metrics = EventLoopMetrics::new();
        metrics.record_cycle(Duration::from_millis(100));
        metrics.record_cycle(Duration::from_millis(300));
        metrics.record_usage(&Usage::new(10, 5));
        metrics.record_usage(&Usage::new(1, 1));
        metrics.update_context_size(42);

        let summary = metrics.summary();
        assert_eq!(summary["total_cycles"], 2);
        assert_eq!(summary["total_duration_ms"], 400);
        assert_eq!(summary["average_cycle_ms"], 200.0);
        assert_eq!(summary["accumulated_usage"]["total_tokens"], 17);
        assert_eq!(summary["latest_context_tokens"], 42);
    }
}
