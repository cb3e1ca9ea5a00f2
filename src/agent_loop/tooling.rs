use std::time::Instant;

use chrono::Utc;
use futures::future;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

use crate::error::OrbitError;
use crate::hooks::{HookEvent, HookRegistry, Interrupt, InterruptRegistry};
use crate::tools::tool::output_to_content;
use crate::tools::{ToolArguments, ToolExecutionContext, ToolRegistry};
use crate::types::{ToolResult, ToolUse};

use super::checkpoint::{ToolProgress, ToolState};
use super::events::{LoopEvent, LoopEventEmitter};
use super::metrics::{ToolExecutionRecord, ToolOutcome};

/// How the tool calls of one model turn are run.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolExecutionMode {
    #[default]
    Concurrent,
    Sequential,
}

pub(crate) struct ToolBatch<'a> {
    pub(crate) tools: &'a dyn ToolRegistry,
    pub(crate) hooks: &'a HookRegistry,
    pub(crate) interrupts: &'a InterruptRegistry,
    pub(crate) cycle: usize,
    pub(crate) mode: ToolExecutionMode,
    pub(crate) cancel: &'a CancellationToken,
    pub(crate) emitter: &'a LoopEventEmitter,
}

#[derive(Debug)]
pub(crate) struct ToolBatchOutcome {
    pub(crate) progress: Vec<ToolProgress>,
    pub(crate) interrupts: Vec<Interrupt>,
    pub(crate) records: Vec<ToolExecutionRecord>,
}

impl ToolBatchOutcome {
    pub(crate) fn is_complete(&self) -> bool {
        self.interrupts.is_empty() && self.progress.iter().all(ToolProgress::is_completed)
    }

    /// Results in request order and the tool-use id of the first
    /// return-direct result, if any.
    pub(crate) fn into_results(self) -> (Vec<ToolResult>, Option<String>) {
        let mut direct = None;
        let results = self
            .progress
            .into_iter()
            .filter_map(|progress| match progress.state {
                ToolState::Completed {
                    result,
                    return_direct,
                    ..
                } => {
                    if return_direct && direct.is_none() {
                        direct = Some(result.tool_use_id.clone());
                    }
                    Some(result)
                }
                _ => None,
            })
            .collect();
        (results, direct)
    }
}

struct ExecutedTool {
    result: ToolResult,
    outcome: ToolOutcome,
    return_direct: bool,
    record: ToolExecutionRecord,
}

fn record_for(
    tool_use: &ToolUse,
    started: Instant,
    outcome: ToolOutcome,
) -> ToolExecutionRecord {
    ToolExecutionRecord {
        tool_name: tool_use.name.clone(),
        tool_use_id: tool_use.id.clone(),
        input: tool_use.input.clone(),
        duration_ms: started.elapsed().as_millis() as u64,
        outcome,
        finished_at: Utc::now(),
    }
}

async fn execute_tool(
    tools: &dyn ToolRegistry,
    tool_use: &ToolUse,
    cancel: CancellationToken,
    emitter: &LoopEventEmitter,
) -> ExecutedTool {
    let started = Instant::now();
    emitter.emit(LoopEvent::ToolStarted {
        tool_use: tool_use.clone(),
    });

    let Some(tool) = tools.resolve(&tool_use.name) else {
        tracing::warn!(tool = %tool_use.name, tool_use_id = %tool_use.id, "unknown tool requested");
        return ExecutedTool {
            result: ToolResult::error(
                tool_use.id.clone(),
                OrbitError::UnknownTool(tool_use.name.clone()).to_string(),
            ),
            outcome: ToolOutcome::UnknownTool,
            return_direct: false,
            record: record_for(tool_use, started, ToolOutcome::UnknownTool),
        };
    };

    let args = ToolArguments::new(tool_use.input.clone());
    let ctx = ToolExecutionContext {
        tool_use_id: tool_use.id.clone(),
        tool_name: tool_use.name.clone(),
        cancel,
        metadata: serde_json::Value::Null,
    };
    let (result, outcome) = match tool.execute(&args, &ctx).await {
        Ok(value) => (
            ToolResult::success(tool_use.id.clone(), output_to_content(value)),
            ToolOutcome::Success,
        ),
        Err(err) => {
            let err = OrbitError::ToolExecution {
                tool_name: tool_use.name.clone(),
                message: err.to_string(),
            };
            (ToolResult::error(tool_use.id.clone(), err.to_string()), ToolOutcome::Error)
        }
    };
    let record = record_for(tool_use, started, outcome);
    tracing::debug!(
        tool = %tool_use.name,
        tool_use_id = %tool_use.id,
        duration_ms = record.duration_ms,
        %outcome,
        "tool call finished"
    );
    ExecutedTool {
        result,
        outcome,
        return_direct: outcome.is_success() && tool.return_direct(),
        record,
    }
}

fn hook_failure_result(tool_use: &ToolUse, err: &OrbitError) -> ToolResult {
    ToolResult::error(tool_use.id.clone(), err.to_string())
}

/// Drive one batch of tool calls as far as hooks allow.
///
/// Before-tool-call hooks run in request order, admitted tools run (all at
/// once or one by one), then after-tool-call hooks run in request order for
/// every tool that produced a result. Tools held back by an interrupt keep
/// their progress so a resume picks up exactly where this left off.
pub(crate) async fn run_tool_batch(
    batch: ToolBatch<'_>,
    mut progress: Vec<ToolProgress>,
) -> Result<ToolBatchOutcome, OrbitError> {
    let mut interrupts = Vec::new();
    let mut records = Vec::new();
    let mut admitted = Vec::new();

    for (index, entry) in progress.iter_mut().enumerate() {
        if entry.state != ToolState::Pending {
            continue;
        }
        let event = HookEvent::BeforeToolCall {
            tool_use: entry.tool_use.clone(),
        };
        let dispatched = match batch.hooks.dispatch(event, batch.cycle, batch.interrupts).await {
            Ok(dispatched) => dispatched,
            Err(err @ OrbitError::Hook { .. }) => {
                entry.state = ToolState::Executed {
                    result: hook_failure_result(&entry.tool_use, &err),
                    outcome: ToolOutcome::Error,
                    return_direct: false,
                };
                continue;
            }
            Err(err) => return Err(err),
        };

        if dispatched.is_interrupted() {
            interrupts.extend(dispatched.interrupts);
            continue;
        }
        if let Some(reason) = dispatched.cancelled {
            tracing::debug!(tool = %entry.tool_use.name, %reason, "tool call cancelled by hook");
            records.push(record_for(&entry.tool_use, Instant::now(), ToolOutcome::Cancelled));
            entry.state = ToolState::Executed {
                result: ToolResult::error(entry.tool_use.id.clone(), reason),
                outcome: ToolOutcome::Cancelled,
                return_direct: false,
            };
            continue;
        }
        if let HookEvent::BeforeToolCall { tool_use } = dispatched.event {
            entry.tool_use = tool_use;
        }
        admitted.push(index);
    }

    let executed: Vec<ExecutedTool> = match batch.mode {
        ToolExecutionMode::Concurrent => {
            let calls = admitted.iter().map(|&index| {
                execute_tool(
                    batch.tools,
                    &progress[index].tool_use,
                    batch.cancel.child_token(),
                    batch.emitter,
                )
            });
            future::join_all(calls).await
        }
        ToolExecutionMode::Sequential => {
            let mut out = Vec::with_capacity(admitted.len());
            for &index in &admitted {
                out.push(
                    execute_tool(
                        batch.tools,
                        &progress[index].tool_use,
                        batch.cancel.child_token(),
                        batch.emitter,
                    )
                    .await,
                );
            }
            out
        }
    };
    for (index, tool) in admitted.into_iter().zip(executed) {
        records.push(tool.record);
        progress[index].state = ToolState::Executed {
            result: tool.result,
            outcome: tool.outcome,
            return_direct: tool.return_direct,
        };
    }

    for entry in progress.iter_mut() {
        let ToolState::Executed {
            result,
            outcome,
            return_direct,
        } = &entry.state
        else {
            continue;
        };
        let (outcome, return_direct) = (*outcome, *return_direct);
        let event = HookEvent::AfterToolCall {
            tool_use: entry.tool_use.clone(),
            result: result.clone(),
        };
        let result = match batch.hooks.dispatch(event, batch.cycle, batch.interrupts).await {
            Ok(dispatched) if dispatched.is_interrupted() => {
                interrupts.extend(dispatched.interrupts);
                continue;
            }
            Ok(dispatched) => match dispatched.event {
                HookEvent::AfterToolCall { result, .. } => result,
                _ => result.clone(),
            },
            Err(err @ OrbitError::Hook { .. }) => hook_failure_result(&entry.tool_use, &err),
            Err(err) => return Err(err),
        };

        batch.emitter.emit(LoopEvent::ToolCompleted {
            tool_name: entry.tool_use.name.clone(),
            result: result.clone(),
            outcome,
        });
        entry.state = ToolState::Completed {
            return_direct: return_direct && !result.is_error(),
            result,
            outcome,
        };
    }

    Ok(ToolBatchOutcome {
        progress,
        interrupts,
        records,
    })
}
