//! The agent entry point: invoke, stream and resume.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::Either;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::agent_loop::events::LoopEventEmitter;
use crate::agent_loop::runner::{run_loop, LoopContext};
use crate::agent_loop::tooling::{run_tool_batch, ToolBatch, ToolExecutionMode};
use crate::agent_loop::{
    AgentResult, Checkpoint, EventLoopMetrics, LoopEvent, LoopEventSink, LoopStage, ToolProgress,
};
use crate::config::LoopConfig;
use crate::conversation::{
    manager_from_config, ConversationHistory, ConversationManager, ReductionReason, Summarizer,
};
use crate::error::OrbitError;
use crate::hooks::{HookEvent, HookRegistry, Interrupt, InterruptResponse, ResumeDisposition};
use crate::provider::ModelProvider;
use crate::session::SessionStore;
use crate::tools::{StaticToolRegistry, ToolRegistry};
use crate::types::{ContentBlock, Message, Role, StructuredOutputConfig, ToolResult, ToolUse};

use super::guard::{InvocationGuard, InvocationPermit};
use super::state::AgentState;

/// An agent that drives a model through tool calls until it stops.
///
/// All methods take `&self`; one invocation runs at a time and a second
/// concurrent call fails with [`OrbitError::Concurrency`].
pub struct Agent {
    model: Arc<dyn ModelProvider>,
    tools: Arc<dyn ToolRegistry>,
    hooks: HookRegistry,
    manager: Arc<dyn ConversationManager>,
    config: LoopConfig,
    guard: InvocationGuard,
    initialized: AtomicBool,
    state: Mutex<AgentState>,
}

#[bon::bon]
impl Agent {
    /// Assemble an agent.
    ///
    /// Without an explicit `conversation_manager` the strategy comes from
    /// `config.conversation`; a summarizing strategy without a `summarizer`
    /// summarizes with the agent's own model.
    #[builder]
    pub fn new(
        model: Arc<dyn ModelProvider>,
        #[builder(default)] config: LoopConfig,
        tools: Option<Arc<dyn ToolRegistry>>,
        #[builder(default)] hooks: HookRegistry,
        conversation_manager: Option<Arc<dyn ConversationManager>>,
        summarizer: Option<Summarizer>,
        #[builder(default)] messages: Vec<Message>,
        structured_output: Option<StructuredOutputConfig>,
    ) -> Self {
        let manager = conversation_manager.unwrap_or_else(|| {
            manager_from_config(&config.conversation, || {
                summarizer.unwrap_or_else(|| Summarizer::Model(Arc::clone(&model)))
            })
        });
        let mut state = AgentState::new(ConversationHistory::new(messages));
        state.structured_output = structured_output;

        Self {
            model,
            tools: tools
                .unwrap_or_else(|| Arc::new(StaticToolRegistry::default()) as Arc<dyn ToolRegistry>),
            hooks,
            manager,
            config,
            guard: InvocationGuard::new(),
            initialized: AtomicBool::new(false),
            state: Mutex::new(state),
        }
    }
}

impl Agent {
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<dyn ModelProvider> {
        &self.model
    }

    pub fn conversation_manager(&self) -> &Arc<dyn ConversationManager> {
        &self.manager
    }

    /// Whether an invocation currently holds the agent.
    pub fn is_busy(&self) -> bool {
        self.guard.is_held()
    }

    /// Run one user prompt to completion or suspension.
    pub async fn invoke(&self, prompt: impl Into<String>) -> Result<AgentResult, OrbitError> {
        self.invoke_messages(vec![Message::user(prompt)]).await
    }

    /// Run with caller-built prompt messages appended to the history.
    pub async fn invoke_messages(&self, prompt: Vec<Message>) -> Result<AgentResult, OrbitError> {
        self.invoke_with_sink(prompt, None).await
    }

    /// Blocking [`Self::invoke`] for callers outside an async runtime.
    ///
    /// Runs the invocation on a private current-thread runtime. Calling it
    /// from inside a runtime is an [`OrbitError::InvalidState`].
    pub fn invoke_blocking(&self, prompt: impl Into<String>) -> Result<AgentResult, OrbitError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(OrbitError::InvalidState(
                "invoke_blocking cannot run inside an async runtime; use invoke".into(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.invoke(prompt))
    }

    /// Like [`Self::invoke`], yielding lifecycle events as they happen.
    ///
    /// The last item is [`LoopEvent::Finished`] or the invocation's error.
    pub fn stream(
        &self,
        prompt: impl Into<String>,
    ) -> BoxStream<'_, Result<LoopEvent, OrbitError>> {
        let prompt = vec![Message::user(prompt)];
        self.event_stream(move |sink| self.invoke_with_sink(prompt, Some(sink)))
    }

    /// Like [`Self::resume`], yielding the lifecycle events of the resumed run.
    pub fn resume_stream(
        &self,
        responses: Vec<InterruptResponse>,
    ) -> BoxStream<'_, Result<LoopEvent, OrbitError>> {
        self.event_stream(move |sink| self.resume_with_sink(responses, Some(sink)))
    }

    fn event_stream<'a, F, Fut>(&'a self, start: F) -> BoxStream<'a, Result<LoopEvent, OrbitError>>
    where
        F: FnOnce(LoopEventSink) -> Fut + Send + 'a,
        Fut: Future<Output = Result<AgentResult, OrbitError>> + Send + 'a,
    {
        Box::pin(async_stream::stream! {
            let (tx, rx) = mpsc::unbounded_channel();
            let sink: LoopEventSink = Arc::new(move |event| {
                let _ = tx.send(event);
            });
            let mut events = UnboundedReceiverStream::new(rx);
            let run = start(sink);
            tokio::pin!(run);

            let outcome = loop {
                let step = tokio::select! {
                    biased;
                    Some(event) = events.next() => Either::Left(event),
                    outcome = &mut run => Either::Right(outcome),
                };
                match step {
                    Either::Left(event) => yield Ok(event),
                    Either::Right(outcome) => break outcome,
                }
            };
            while let Some(event) = events.next().await {
                yield Ok(event);
            }
            match outcome {
                Ok(result) => yield Ok(LoopEvent::Finished(Box::new(result))),
                Err(err) => yield Err(err),
            }
        })
    }

    /// Continue a suspended invocation with responses keyed by interrupt id.
    ///
    /// Resuming again with responses that were already consumed returns the
    /// cached result of the completed invocation.
    pub async fn resume(
        &self,
        responses: Vec<InterruptResponse>,
    ) -> Result<AgentResult, OrbitError> {
        self.resume_with_sink(responses, None).await
    }

    /// Resume from a checkpoint persisted outside this agent.
    pub async fn resume_from(
        &self,
        checkpoint: Checkpoint,
        responses: Vec<InterruptResponse>,
    ) -> Result<AgentResult, OrbitError> {
        let permit = self.guard.try_acquire()?;
        let mut state = self.state.lock().await;
        state
            .interrupts
            .restore(checkpoint.invocation_id.clone(), checkpoint.interrupts.clone());
        state.checkpoint = Some(checkpoint);
        self.resume_locked(permit, &mut state, responses, None).await
    }

    /// Run one registered tool directly, outside of a model turn.
    ///
    /// Tool-call hooks and metrics apply as they do inside the loop. With
    /// `record_in_history` the call is written to the history as a user
    /// request, the tool use, its result and an assistant acknowledgement, so
    /// the model sees it on the next invocation. A hook interrupt fails the
    /// call since there is no invocation to suspend.
    pub async fn call_tool(
        &self,
        name: &str,
        input: serde_json::Value,
        record_in_history: bool,
    ) -> Result<ToolResult, OrbitError> {
        let _permit = self.guard.try_acquire()?;
        if self.tools.resolve(name).is_none() {
            return Err(OrbitError::UnknownTool(name.to_string()));
        }
        let mut state = self.state.lock().await;
        if state.checkpoint.is_some() {
            return Err(OrbitError::InvalidState(
                "invocation is suspended on interrupts; resume or discard it first".into(),
            ));
        }

        let tool_use = ToolUse::new(
            format!("tooluse_{name}_{}", uuid::Uuid::new_v4().simple()),
            name,
            input,
        );
        let cancel = CancellationToken::new();
        let emitter = LoopEventEmitter::new(None);
        let mut outcome = run_tool_batch(
            ToolBatch {
                tools: self.tools.as_ref(),
                hooks: &self.hooks,
                interrupts: &state.interrupts,
                cycle: 0,
                mode: ToolExecutionMode::Sequential,
                cancel: &cancel,
                emitter: &emitter,
            },
            vec![ToolProgress::pending(tool_use.clone())],
        )
        .await?;
        for record in std::mem::take(&mut outcome.records) {
            state.metrics.record_tool(record);
        }
        if !outcome.is_complete() {
            return Err(OrbitError::InvalidState(format!(
                "direct call of '{name}' was interrupted by a hook"
            )));
        }
        let (mut results, _) = outcome.into_results();
        let result = results.pop().ok_or_else(|| {
            OrbitError::InvalidState(format!("direct call of '{name}' produced no result"))
        })?;
        tracing::debug!(
            tool = name,
            tool_use_id = %tool_use.id,
            error = result.is_error(),
            "direct tool call finished"
        );

        if record_in_history {
            let request = Message::user(format!(
                "{name} direct tool call.\nInput parameters: {}\n",
                tool_use.input
            ));
            let ack = Message::assistant(format!("{name} was called."));
            for message in [
                request,
                Message::new(Role::Assistant, vec![ContentBlock::ToolUse(tool_use)]),
                Message::tool_results(vec![result.clone()]),
                ack,
            ] {
                state.history.push(message);
            }
            let tokens = state.history.token_estimate();
            state.metrics.update_context_size(tokens);
        }
        Ok(result)
    }

    /// Abandon a suspended invocation so new prompts are accepted.
    pub async fn discard_checkpoint(&self) -> Result<Option<Checkpoint>, OrbitError> {
        let _permit = self.guard.try_acquire()?;
        let mut state = self.state.lock().await;
        state.interrupts.reset();
        Ok(state.checkpoint.take())
    }

    pub async fn checkpoint(&self) -> Option<Checkpoint> {
        self.state.lock().await.checkpoint.clone()
    }

    pub async fn pending_interrupts(&self) -> Vec<Interrupt> {
        self.state.lock().await.interrupts.pending().to_vec()
    }

    /// Snapshot of the conversation history.
    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.history.messages().to_vec()
    }

    pub async fn metrics(&self) -> EventLoopMetrics {
        self.state.lock().await.metrics.clone()
    }

    /// Set the structured-output configuration, returning the previous one.
    pub async fn set_structured_output(
        &self,
        config: Option<StructuredOutputConfig>,
    ) -> Option<StructuredOutputConfig> {
        self.state.lock().await.replace_structured_output(config)
    }

    pub async fn structured_output(&self) -> Option<StructuredOutputConfig> {
        self.state.lock().await.structured_output.clone()
    }

    /// Apply the conversation manager outside of an invocation.
    pub async fn reduce_context(&self, reason: ReductionReason) -> Result<(), OrbitError> {
        let _permit = self.guard.try_acquire()?;
        let mut state = self.state.lock().await;
        let before = state.history.token_estimate();
        Arc::clone(&self.manager)
            .reduce_async(&mut state.history, reason)
            .await?;
        let after = state.history.token_estimate();
        state.metrics.record_reduction();
        state.metrics.update_context_size(after);
        tracing::info!(
            strategy = self.manager.name(),
            %reason,
            tokens_before = before,
            tokens_after = after,
            "reduced conversation context on request"
        );
        Ok(())
    }

    /// Replace the history with a stored session. Returns `false` when the
    /// store has no such session.
    pub async fn load_session(
        &self,
        store: &dyn SessionStore,
        session_id: &str,
    ) -> Result<bool, OrbitError> {
        let _permit = self.guard.try_acquire()?;
        let mut state = self.state.lock().await;
        if state.checkpoint.is_some() {
            return Err(OrbitError::InvalidState(
                "cannot load a session while an invocation is suspended".into(),
            ));
        }
        let Some(messages) = store.load(session_id).await? else {
            return Ok(false);
        };
        state.history = ConversationHistory::new(messages);
        let tokens = state.history.token_estimate();
        state.metrics.update_context_size(tokens);
        tracing::debug!(session_id, messages = state.history.len(), "loaded session");
        Ok(true)
    }

    pub async fn save_session(
        &self,
        store: &dyn SessionStore,
        session_id: &str,
    ) -> Result<(), OrbitError> {
        let state = self.state.lock().await;
        store.save(session_id, state.history.messages()).await
    }

    /// Run this agent over `messages` plus `request` as a one-off
    /// summarizer and return its final message.
    ///
    /// History and structured-output configuration are restored afterwards,
    /// whether or not the run succeeded.
    pub(crate) async fn summarize(
        &self,
        messages: Vec<Message>,
        request: &str,
        system_prompt: &str,
    ) -> Result<Message, OrbitError> {
        let _permit = self.guard.try_acquire()?;
        let mut state = self.state.lock().await;
        if state.checkpoint.is_some() {
            return Err(OrbitError::InvalidState(
                "summarizer agent has a suspended invocation".into(),
            ));
        }

        let saved_history =
            std::mem::replace(&mut state.history, ConversationHistory::new(messages));
        let saved_output = state.replace_structured_output(None);

        let mut config = self.config.clone();
        config.system_prompt = Some(system_prompt.to_string());
        let stage = LoopStage::BeforeInvocation {
            prompt: vec![Message::user(request)],
        };
        state.interrupts.begin_invocation();
        let outcome = self.run_with(&mut state, &config, 0, stage, None).await;

        state.history = saved_history;
        state.replace_structured_output(saved_output);

        let result = outcome?;
        if result.is_interrupted() {
            state.checkpoint = None;
            state.interrupts.reset();
            return Err(OrbitError::InvalidState(
                "summarizer agent was interrupted".into(),
            ));
        }
        Ok(result.message)
    }

    async fn invoke_with_sink(
        &self,
        prompt: Vec<Message>,
        sink: Option<LoopEventSink>,
    ) -> Result<AgentResult, OrbitError> {
        let _permit = self.guard.try_acquire()?;
        if prompt
            .iter()
            .any(|message| message.role == Role::User && message.has_tool_use())
        {
            return Err(OrbitError::InvalidArgument(
                "user messages cannot contain tool-use blocks".into(),
            ));
        }

        let mut state = self.state.lock().await;
        if state.checkpoint.is_some() {
            return Err(OrbitError::InvalidState(
                "invocation is suspended on interrupts; resume or discard it first".into(),
            ));
        }
        state.interrupts.begin_invocation();
        let stage = LoopStage::BeforeInvocation { prompt };
        self.run_with(&mut state, &self.config, 0, stage, sink).await
    }

    async fn resume_with_sink(
        &self,
        responses: Vec<InterruptResponse>,
        sink: Option<LoopEventSink>,
    ) -> Result<AgentResult, OrbitError> {
        let permit = self.guard.try_acquire()?;
        let mut state = self.state.lock().await;
        self.resume_locked(permit, &mut state, responses, sink).await
    }

    async fn resume_locked(
        &self,
        _permit: InvocationPermit,
        state: &mut AgentState,
        responses: Vec<InterruptResponse>,
        sink: Option<LoopEventSink>,
    ) -> Result<AgentResult, OrbitError> {
        if let ResumeDisposition::AlreadyApplied = state.interrupts.apply_responses(responses)? {
            tracing::debug!("responses already applied; returning cached result");
            return state.last_result.clone().ok_or_else(|| {
                OrbitError::InvalidState("no completed invocation to return".into())
            });
        }
        let Some(checkpoint) = state.checkpoint.take() else {
            return Err(OrbitError::InvalidState(
                "interrupts are pending without a checkpoint".into(),
            ));
        };
        tracing::info!(
            invocation_id = %checkpoint.invocation_id,
            cycle = checkpoint.cycle,
            stage = checkpoint.stage.name(),
            "resuming suspended invocation"
        );
        self.run_with(state, &self.config, checkpoint.cycle, checkpoint.stage, sink)
            .await
    }

    async fn run_with(
        &self,
        state: &mut AgentState,
        config: &LoopConfig,
        cycle: usize,
        stage: LoopStage,
        sink: Option<LoopEventSink>,
    ) -> Result<AgentResult, OrbitError> {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            self.hooks
                .dispatch(HookEvent::AgentInitialized, 0, &state.interrupts)
                .await?;
        }

        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();
        let ctx = LoopContext {
            model: self.model.as_ref(),
            tools: self.tools.as_ref(),
            hooks: &self.hooks,
            manager: Arc::clone(&self.manager),
            config,
            emitter: LoopEventEmitter::new(sink),
            cancel,
        };
        run_loop(&ctx, state, cycle, stage).await
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("model", &self.model.model_id())
            .field("manager", &self.manager.name())
            .field("config", &self.config)
            .field("busy", &self.guard.is_held())
            .finish()
    }
}
