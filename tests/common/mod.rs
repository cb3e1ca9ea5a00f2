//! Shared test helpers and scripted provider.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use orbit::error::OrbitError;
use orbit::provider::{ModelProvider, ModelRequest, ModelResponse};
use orbit::tools::{AgentTool, AgentToolParameters, Tool};
use orbit::types::*;

enum Step {
    Respond(ModelResponse),
    Fail(OrbitError),
}

/// A provider that replays a fixed script of turns and records every request.
pub struct ScriptedModel {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue an `end_turn` text reply.
    pub fn text(self, text: &str) -> Self {
        self.respond(text_response(text))
    }

    /// Queue a turn requesting the given `(id, name, input)` tool calls.
    pub fn tool_calls(self, calls: &[(&str, &str, serde_json::Value)]) -> Self {
        self.respond(tool_use_response(calls))
    }

    pub fn respond(self, response: ModelResponse) -> Self {
        self.steps.lock().unwrap().push_back(Step::Respond(response));
        self
    }

    pub fn fail(self, error: OrbitError) -> Self {
        self.steps.lock().unwrap().push_back(Step::Fail(error));
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedModel {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, OrbitError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.steps.lock().unwrap().pop_front() {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(error)) => Err(error),
            None => Err(OrbitError::InvalidState("model script exhausted".into())),
        }
    }
}

pub fn text_response(text: &str) -> ModelResponse {
    ModelResponse::new(vec![ContentBlock::text(text)], StopReason::EndTurn)
        .with_usage(Usage::new(10, 5))
}

pub fn tool_use_response(calls: &[(&str, &str, serde_json::Value)]) -> ModelResponse {
    let content = calls
        .iter()
        .map(|(id, name, input)| ContentBlock::ToolUse(ToolUse::new(*id, *name, input.clone())))
        .collect();
    ModelResponse::new(content, StopReason::ToolUse).with_usage(Usage::new(10, 5))
}

/// Tool that returns `output` and counts its invocations.
pub fn counting_tool(name: &str, output: &str, calls: Arc<AtomicUsize>) -> Arc<dyn Tool> {
    let output = output.to_string();
    Arc::new(AgentTool::new(
        name,
        "test tool",
        AgentToolParameters::empty(),
        move |_args, _ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            let output = output.clone();
            async move { Ok(serde_json::json!(output)) }
        },
    ))
}

/// Tool that sleeps for `delay` before returning `output`.
pub fn delayed_tool(name: &str, output: &str, delay: Duration) -> Arc<dyn Tool> {
    let output = output.to_string();
    Arc::new(AgentTool::new(
        name,
        "slow test tool",
        AgentToolParameters::empty(),
        move |_args, _ctx| {
            let output = output.clone();
            async move {
                tokio::time::sleep(delay).await;
                Ok(serde_json::json!(output))
            }
        },
    ))
}

/// Tool that always fails.
pub fn failing_tool(name: &str, calls: Arc<AtomicUsize>) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        name,
        "broken test tool",
        AgentToolParameters::empty(),
        move |_args, _ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(OrbitError::InvalidState("backend unavailable".into())) }
        },
    ))
}

/// `count` alternating user/assistant text messages, starting with a user.
pub fn text_history(count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            if i % 2 == 0 {
                Message::user(format!("question {i}"))
            } else {
                Message::assistant(format!("answer {i}"))
            }
        })
        .collect()
}
