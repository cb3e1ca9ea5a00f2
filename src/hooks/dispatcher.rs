//! Hook handler registration and dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::events::HookEvent;
use super::interrupts::{Interrupt, InterruptRegistry};
use crate::error::OrbitError;

/// Error returned by a hook handler.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HookError {
    /// The handler paused the cycle. Produced by [`HookContext::interrupt`].
    #[error("interrupted: {0}")]
    Interrupt(String),
    #[error("{0}")]
    Failed(String),
}

/// Mutable view of one event handed to each handler in turn.
#[derive(Debug)]
pub struct HookContext<'a> {
    pub event: HookEvent,
    cycle: usize,
    event_key: String,
    responses: &'a HashMap<String, serde_json::Value>,
    raised: Vec<Interrupt>,
    cancel_reason: Option<String>,
}

impl<'a> HookContext<'a> {
    fn new(event: HookEvent, cycle: usize, interrupts: &'a InterruptRegistry) -> Self {
        let event_key = event.interrupt_key(interrupts.invocation_id(), cycle);
        Self {
            event,
            cycle,
            event_key,
            responses: interrupts.responses(),
            raised: Vec::new(),
            cancel_reason: None,
        }
    }

    pub fn cycle(&self) -> usize {
        self.cycle
    }

    /// Ask the caller for input.
    ///
    /// Returns the caller's response when resuming with one for this
    /// interrupt; otherwise records the interrupt and returns
    /// [`HookError::Interrupt`] for the handler to propagate with `?`.
    pub fn interrupt(
        &mut self,
        name: impl Into<String>,
        reason: impl Into<serde_json::Value>,
    ) -> Result<serde_json::Value, HookError> {
        let name = name.into();
        let id = Interrupt::id_for(&self.event_key, &name);
        if let Some(response) = self.responses.get(&id) {
            return Ok(response.clone());
        }
        if !self.raised.iter().any(|i| i.id == id) {
            self.raised.push(Interrupt {
                id: id.clone(),
                name,
                reason: reason.into(),
                response: None,
            });
        }
        Err(HookError::Interrupt(id))
    }

    /// Cancel the tool call this before-tool-call event describes. The tool
    /// is not run and an error result carrying `reason` is produced instead.
    pub fn cancel_tool(&mut self, reason: impl Into<String>) {
        self.cancel_reason = Some(reason.into());
    }
}

/// A lifecycle hook handler.
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError>;
}

/// Adapter turning a synchronous closure into a [`HookHandler`].
pub struct FnHook<F>(pub F);

#[async_trait]
impl<F> HookHandler for FnHook<F>
where
    F: Fn(&mut HookContext<'_>) -> Result<(), HookError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        (self.0)(ctx)
    }
}

/// Result of dispatching one event to every handler.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// The event after handlers had their chance to modify it.
    pub event: HookEvent,
    pub interrupts: Vec<Interrupt>,
    pub cancelled: Option<String>,
}

impl DispatchOutcome {
    pub fn is_interrupted(&self) -> bool {
        !self.interrupts.is_empty()
    }
}

/// Ordered set of hook handlers.
#[derive(Clone, Default)]
pub struct HookRegistry {
    handlers: Vec<Arc<dyn HookHandler>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: Arc<dyn HookHandler>) {
        self.handlers.push(handler);
    }

    /// Register a synchronous closure.
    pub fn on<F>(&mut self, handler: F)
    where
        F: Fn(&mut HookContext<'_>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(FnHook(handler)));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler in registration order.
    ///
    /// `interrupts` supplies the invocation identity and the resume
    /// responses. An interrupt from one handler does not stop the others; the
    /// raised interrupts are collected on the outcome. A failing handler
    /// aborts the dispatch.
    pub async fn dispatch(
        &self,
        event: HookEvent,
        cycle: usize,
        interrupts: &InterruptRegistry,
    ) -> Result<DispatchOutcome, OrbitError> {
        let stage = event.stage();
        let mut ctx = HookContext::new(event, cycle, interrupts);

        for handler in &self.handlers {
            match handler.handle(&mut ctx).await {
                Ok(()) | Err(HookError::Interrupt(_)) => {}
                Err(HookError::Failed(message)) => {
                    return Err(OrbitError::Hook {
                        stage: stage.to_string(),
                        message,
                    });
                }
            }
        }

        if !ctx.raised.is_empty() {
            if !stage.is_interruptible() {
                return Err(OrbitError::InvalidState(format!(
                    "{stage} hooks cannot raise interrupts"
                )));
            }
            tracing::debug!(
                %stage,
                cycle,
                count = ctx.raised.len(),
                "hook dispatch raised interrupts"
            );
        }

        Ok(DispatchOutcome {
            event: ctx.event,
            interrupts: ctx.raised,
            cancelled: ctx.cancel_reason,
        })
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::events::HookStage;
    use crate::hooks::interrupts::InterruptResponse;
    use crate::types::{ToolResult, ToolUse};
    use std::sync::Mutex;

    fn tool_event() -> HookEvent {
        HookEvent::BeforeToolCall {
            tool_use: ToolUse::new("t1", "delete", serde_json::json!({"path": "/tmp/x"})),
        }
    }

    #[tokio::test]
    async fn handlers_run_in_order_and_all_run_after_an_interrupt() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = HookRegistry::new();
        let first = Arc::clone(&seen);
        hooks.on(move |ctx| {
            first.lock().unwrap().push("first");
            ctx.interrupt("approval", "confirm delete")?;
            Ok(())
        });
        let second = Arc::clone(&seen);
        hooks.on(move |_ctx| {
            second.lock().unwrap().push("second");
            Ok(())
        });

        let outcome = hooks
            .dispatch(tool_event(), 0, &InterruptRegistry::new())
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(outcome.interrupts.len(), 1);
        assert_eq!(outcome.interrupts[0].name, "approval");
    }

    #[tokio::test]
    async fn stored_response_is_returned_instead_of_raising() {
        let mut hooks = HookRegistry::new();
        hooks.on(|ctx| {
            let answer = ctx.interrupt("approval", "confirm delete")?;
            if answer != "yes" {
                ctx.cancel_tool("denied");
            }
            Ok(())
        });

        let mut interrupts = InterruptRegistry::new();
        interrupts.begin_invocation();
        let key = tool_event().interrupt_key(interrupts.invocation_id(), 0);
        let id = Interrupt::id_for(&key, "approval");
        interrupts.raise([Interrupt {
            id: id.clone(),
            name: "approval".into(),
            reason: serde_json::Value::Null,
            response: None,
        }]);
        interrupts
            .apply_responses(vec![InterruptResponse::new(id, serde_json::json!("no"))])
            .unwrap();
        let outcome = hooks.dispatch(tool_event(), 0, &interrupts).await.unwrap();

        assert!(!outcome.is_interrupted());
        assert_eq!(outcome.cancelled.as_deref(), Some("denied"));
    }

    #[tokio::test]
    async fn handlers_can_rewrite_tool_results() {
        let mut hooks = HookRegistry::new();
        hooks.on(|ctx| {
            if let HookEvent::AfterToolCall { result, .. } = &mut ctx.event {
                *result = ToolResult::error(result.tool_use_id.clone(), "redacted");
            }
            Ok(())
        });
        let event = HookEvent::AfterToolCall {
            tool_use: ToolUse::new("t1", "read", serde_json::json!({})),
            result: ToolResult::success("t1", vec![]),
        };

        let outcome = hooks
            .dispatch(event, 2, &InterruptRegistry::new())
            .await
            .unwrap();
        match outcome.event {
            HookEvent::AfterToolCall { result, .. } => assert_eq!(result.text(), "redacted"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn notification_only_stage_rejects_interrupts() {
        let mut hooks = HookRegistry::new();
        hooks.on(|ctx| {
            ctx.interrupt("nope", serde_json::Value::Null)?;
            Ok(())
        });
        let err = hooks
            .dispatch(HookEvent::AgentInitialized, 0, &InterruptRegistry::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrbitError::InvalidState(_)));
        assert!(!HookStage::AgentInitialized.is_interruptible());
    }

    #[tokio::test]
    async fn failing_handler_aborts_dispatch() {
        let mut hooks = HookRegistry::new();
        hooks.on(|_ctx| Err(HookError::Failed("boom".into())));
        let err = hooks
            .dispatch(
                HookEvent::BeforeModelCall { message_count: 1 },
                0,
                &InterruptRegistry::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrbitError::Hook { .. }));
    }
}
