//! Cycle state machine driving model calls, tool batches and hooks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentState;
use crate::config::LoopConfig;
use crate::conversation::{ConversationManager, ReductionReason};
use crate::error::OrbitError;
use crate::hooks::{DispatchOutcome, HookEvent, HookRegistry, Interrupt};
use crate::provider::{
    ModelProvider, ModelRequest, ModelResponse, ModelStreamEvent, StreamAccumulator,
};
use crate::tools::ToolRegistry;
use crate::types::{Message, Role, StopReason};

use super::checkpoint::{Checkpoint, LoopStage, ToolProgress};
use super::events::{LoopEvent, LoopEventEmitter};
use super::tooling::{run_tool_batch, ToolBatch};
use super::types::AgentResult;

/// Collaborators shared by every cycle of one invocation.
pub(crate) struct LoopContext<'a> {
    pub(crate) model: &'a dyn ModelProvider,
    pub(crate) tools: &'a dyn ToolRegistry,
    pub(crate) hooks: &'a HookRegistry,
    pub(crate) manager: Arc<dyn ConversationManager>,
    pub(crate) config: &'a LoopConfig,
    pub(crate) emitter: LoopEventEmitter,
    pub(crate) cancel: CancellationToken,
}

/// Run the state machine from `stage` until it finishes, suspends or fails.
///
/// Any stage past `BeforeInvocation` is a resume: before-invocation hooks
/// see the invocation again before the stage is re-entered, so every
/// after-invocation dispatch is paired with a before-invocation one.
/// After-invocation hooks fire on every exit path.
pub(crate) async fn run_loop(
    ctx: &LoopContext<'_>,
    state: &mut AgentState,
    cycle: usize,
    stage: LoopStage,
) -> Result<AgentResult, OrbitError> {
    tracing::debug!(cycle, stage = stage.name(), "entering agent loop");
    let outcome = match stage {
        LoopStage::BeforeInvocation { .. } => drive(ctx, state, cycle, stage).await,
        stage => resume(ctx, state, cycle, stage).await,
    };

    let stop_reason = outcome.as_ref().ok().map(|result| result.stop_reason);
    let after = ctx
        .hooks
        .dispatch(
            HookEvent::AfterInvocation { stop_reason },
            cycle,
            &state.interrupts,
        )
        .await;

    match (outcome, after) {
        (Ok(result), Ok(_)) => Ok(result),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), after) => {
            if let Err(hook_err) = after {
                tracing::warn!(error = %hook_err, "after-invocation hook failed during error exit");
            }
            tracing::warn!(error = %err, "agent invocation failed");
            Err(err)
        }
    }
}

async fn dispatch(
    ctx: &LoopContext<'_>,
    state: &AgentState,
    event: HookEvent,
    cycle: usize,
) -> Result<DispatchOutcome, OrbitError> {
    ctx.hooks.dispatch(event, cycle, &state.interrupts).await
}

async fn resume(
    ctx: &LoopContext<'_>,
    state: &mut AgentState,
    cycle: usize,
    stage: LoopStage,
) -> Result<AgentResult, OrbitError> {
    let event = HookEvent::BeforeInvocation {
        messages: state.history.messages().to_vec(),
    };
    // Before-invocation always belongs to cycle 0, so answers given when the
    // invocation first started still apply.
    let dispatched = dispatch(ctx, state, event, 0).await?;
    if dispatched.is_interrupted() {
        return Ok(suspend(ctx, state, cycle, stage, dispatched.interrupts));
    }
    ctx.emitter.emit(LoopEvent::InvocationResumed {
        cycle,
        stage: stage.name(),
    });
    drive(ctx, state, cycle, stage).await
}

fn suspend(
    ctx: &LoopContext<'_>,
    state: &mut AgentState,
    cycle: usize,
    stage: LoopStage,
    interrupts: Vec<Interrupt>,
) -> AgentResult {
    state.interrupts.raise(interrupts);
    let pending = state.interrupts.pending().to_vec();
    tracing::info!(
        cycle,
        stage = stage.name(),
        interrupts = pending.len(),
        "invocation suspended on interrupts"
    );
    let checkpoint = Checkpoint::new(
        state.interrupts.invocation_id(),
        cycle,
        stage,
        pending.clone(),
    );
    state.checkpoint = Some(checkpoint.clone());
    ctx.emitter.emit(LoopEvent::Interrupted {
        interrupts: pending.clone(),
    });

    let mut result = AgentResult::new(
        StopReason::Interrupt,
        Message::new(Role::Assistant, Vec::new()),
        state.metrics.clone(),
    );
    result.interrupts = pending;
    result.checkpoint = Some(checkpoint);
    result
}

fn append(ctx: &LoopContext<'_>, state: &mut AgentState, message: Message) -> usize {
    let index = state.history.push(message.clone());
    state
        .metrics
        .update_context_size(state.history.token_estimate());
    ctx.emitter.emit(LoopEvent::MessageAdded { index, message });
    index
}

async fn reduce_context(
    ctx: &LoopContext<'_>,
    state: &mut AgentState,
    reason: ReductionReason,
) -> Result<(), OrbitError> {
    let tokens_before = state.history.token_estimate();
    Arc::clone(&ctx.manager)
        .reduce_async(&mut state.history, reason)
        .await?;
    let tokens_after = state.history.token_estimate();
    state.metrics.record_reduction();
    state.metrics.update_context_size(tokens_after);
    tracing::info!(
        strategy = ctx.manager.name(),
        %reason,
        tokens_before,
        tokens_after,
        messages = state.history.len(),
        "reduced conversation context"
    );
    ctx.emitter.emit(LoopEvent::ContextReduced {
        strategy: ctx.manager.name(),
        tokens_before,
        tokens_after,
    });
    Ok(())
}

async fn call_model(
    ctx: &LoopContext<'_>,
    state: &AgentState,
) -> Result<ModelResponse, OrbitError> {
    let request = ModelRequest::new(state.history.messages().to_vec())
        .with_system_prompt(ctx.config.system_prompt.clone())
        .with_tools(ctx.tools.specs())
        .with_structured_output(state.structured_output.clone());

    let mut stream = ctx.model.stream(&request).await?;
    let mut accumulator = StreamAccumulator::new();
    while let Some(event) = stream.next().await {
        let event = event?;
        if let ModelStreamEvent::TextDelta(text) = &event {
            ctx.emitter.emit(LoopEvent::TextDelta { text: text.clone() });
        }
        accumulator.push(event)?;
    }
    accumulator.finish()
}

fn structured_output(state: &AgentState, message: &Message) -> Option<serde_json::Value> {
    state.structured_output.as_ref()?;
    let text = message.text();
    match serde_json::from_str(text.trim()) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(error = %err, "final message is not valid structured output");
            None
        }
    }
}

fn record_cycle(state: &mut AgentState, started: &mut Option<Instant>) {
    let elapsed = started.take().map(|at| at.elapsed()).unwrap_or(Duration::ZERO);
    state.metrics.record_cycle(elapsed);
}

async fn drive(
    ctx: &LoopContext<'_>,
    state: &mut AgentState,
    mut cycle: usize,
    mut stage: LoopStage,
) -> Result<AgentResult, OrbitError> {
    let mut cycle_started: Option<Instant> = None;

    loop {
        stage = match stage {
            LoopStage::BeforeInvocation { prompt } => {
                let event = HookEvent::BeforeInvocation {
                    messages: state.history.messages().to_vec(),
                };
                let dispatched = dispatch(ctx, state, event, cycle).await?;
                if dispatched.is_interrupted() {
                    return Ok(suspend(
                        ctx,
                        state,
                        cycle,
                        LoopStage::BeforeInvocation { prompt },
                        dispatched.interrupts,
                    ));
                }
                ctx.emitter.emit(LoopEvent::InvocationStarted);

                let indices: Vec<usize> = prompt
                    .into_iter()
                    .map(|message| append(ctx, state, message))
                    .collect();
                indices
                    .into_iter()
                    .rev()
                    .fold(LoopStage::AwaitingModel, |then, index| LoopStage::MessageAdded {
                        index,
                        then: Box::new(then),
                    })
            }

            LoopStage::AwaitingModel => {
                if cycle >= ctx.config.max_cycles {
                    return Err(OrbitError::MaxCyclesExceeded {
                        max_cycles: ctx.config.max_cycles,
                    });
                }
                if ctx.manager.needs_reduction(&state.history) {
                    reduce_context(ctx, state, ReductionReason::Proactive).await?;
                }

                let event = HookEvent::BeforeModelCall {
                    message_count: state.history.len(),
                };
                let dispatched = dispatch(ctx, state, event, cycle).await?;
                if dispatched.is_interrupted() {
                    return Ok(suspend(
                        ctx,
                        state,
                        cycle,
                        LoopStage::AwaitingModel,
                        dispatched.interrupts,
                    ));
                }

                ctx.emitter.emit(LoopEvent::CycleStarted { cycle });
                cycle_started.get_or_insert_with(Instant::now);
                tracing::debug!(
                    cycle,
                    model = ctx.model.model_id(),
                    messages = state.history.len(),
                    tokens = state.history.token_estimate(),
                    "calling model"
                );

                match call_model(ctx, state).await {
                    Ok(response) => {
                        state.metrics.record_usage(&response.usage);
                        ctx.emitter.emit(LoopEvent::ModelResponded {
                            cycle,
                            stop_reason: response.stop_reason,
                        });
                        LoopStage::ProcessingContent { response }
                    }
                    Err(OrbitError::ContextWindowOverflow(message)) => {
                        tracing::warn!(cycle, %message, "provider reported context overflow");
                        reduce_context(ctx, state, ReductionReason::ContextWindowOverflow).await?;
                        LoopStage::AwaitingModel
                    }
                    Err(err) => return Err(err),
                }
            }

            LoopStage::ProcessingContent { response } => {
                let event = HookEvent::AfterModelCall { response };
                let dispatched = dispatch(ctx, state, event, cycle).await?;
                let HookEvent::AfterModelCall { response } = dispatched.event else {
                    return Err(OrbitError::InvalidState(
                        "after-model-call hook replaced the event".into(),
                    ));
                };
                if !dispatched.interrupts.is_empty() {
                    return Ok(suspend(
                        ctx,
                        state,
                        cycle,
                        LoopStage::ProcessingContent { response },
                        dispatched.interrupts,
                    ));
                }

                let message = Message::new(Role::Assistant, response.content);
                let tool_uses: Vec<ToolProgress> = message
                    .tool_uses()
                    .into_iter()
                    .cloned()
                    .map(ToolProgress::pending)
                    .collect();
                let then = if tool_uses.is_empty() {
                    LoopStage::Finished {
                        stop_reason: response.stop_reason,
                        message: message.clone(),
                    }
                } else {
                    LoopStage::ExecutingTools { tools: tool_uses }
                };
                let index = append(ctx, state, message);
                LoopStage::MessageAdded {
                    index,
                    then: Box::new(then),
                }
            }

            LoopStage::MessageAdded { index, then } => {
                if let Some(message) = state.history.get(index).cloned() {
                    let event = HookEvent::MessageAdded { index, message };
                    let dispatched = dispatch(ctx, state, event, cycle).await?;
                    if dispatched.is_interrupted() {
                        return Ok(suspend(
                            ctx,
                            state,
                            cycle,
                            LoopStage::MessageAdded { index, then },
                            dispatched.interrupts,
                        ));
                    }
                }
                *then
            }

            LoopStage::ExecutingTools { tools } => {
                let batch = ToolBatch {
                    tools: ctx.tools,
                    hooks: ctx.hooks,
                    interrupts: &state.interrupts,
                    cycle,
                    mode: ctx.config.tool_execution,
                    cancel: &ctx.cancel,
                    emitter: &ctx.emitter,
                };
                let mut outcome = run_tool_batch(batch, tools).await?;
                for record in std::mem::take(&mut outcome.records) {
                    state.metrics.record_tool(record);
                }
                if !outcome.is_complete() {
                    let interrupts = std::mem::take(&mut outcome.interrupts);
                    return Ok(suspend(
                        ctx,
                        state,
                        cycle,
                        LoopStage::ExecutingTools {
                            tools: outcome.progress,
                        },
                        interrupts,
                    ));
                }

                let (results, direct) = outcome.into_results();
                record_cycle(state, &mut cycle_started);
                let message = Message::tool_results(results);
                // A return-direct result ends the invocation with the tool
                // result message itself as the final message.
                let then = match direct {
                    Some(tool_use_id) => {
                        tracing::debug!(cycle, %tool_use_id, "return-direct tool ends invocation");
                        LoopStage::Finished {
                            stop_reason: StopReason::ToolUse,
                            message: message.clone(),
                        }
                    }
                    None => {
                        cycle += 1;
                        LoopStage::AwaitingModel
                    }
                };
                let index = append(ctx, state, message);
                LoopStage::MessageAdded {
                    index,
                    then: Box::new(then),
                }
            }

            LoopStage::Finished {
                stop_reason,
                message,
            } => {
                if cycle_started.is_some() {
                    record_cycle(state, &mut cycle_started);
                }
                let structured = structured_output(state, &message);
                state.interrupts.complete();
                state.checkpoint = None;

                let mut result = AgentResult::new(stop_reason, message, state.metrics.clone());
                result.structured_output = structured;
                state.last_result = Some(result.clone());
                tracing::debug!(
                    cycle,
                    %stop_reason,
                    cycles = state.metrics.cycle_count,
                    "invocation finished"
                );
                return Ok(result);
            }
        };
    }
}
