//! Incremental model output and its accumulation into content blocks.

use crate::error::OrbitError;
use crate::types::{ContentBlock, StopReason, ToolUse, Usage};

use super::ModelResponse;

/// One incremental event from a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStreamEvent {
    TextDelta(String),
    ToolUseStart { id: String, name: String },
    /// A fragment of the JSON-encoded input of the tool use with `id`.
    ToolUseDelta { id: String, input_json: String },
    /// A finished block passed through as-is (reasoning, cache points, ...).
    Block(ContentBlock),
    /// Closes the open text or tool-use block. Text after it starts a new
    /// block; a closed text block is kept even when empty.
    BlockStop,
    Stop { stop_reason: StopReason, usage: Usage },
}

/// Expand a complete response into the event sequence a streaming provider
/// would have produced. Accumulating the events yields the same blocks.
pub(crate) fn events_from_response(response: ModelResponse) -> Vec<ModelStreamEvent> {
    let mut events = Vec::with_capacity(response.content.len() * 2 + 1);
    for block in response.content {
        match block {
            ContentBlock::Text(text) => {
                events.push(ModelStreamEvent::TextDelta(text));
                events.push(ModelStreamEvent::BlockStop);
            }
            ContentBlock::ToolUse(tool_use) => {
                events.push(ModelStreamEvent::ToolUseStart {
                    id: tool_use.id.clone(),
                    name: tool_use.name,
                });
                events.push(ModelStreamEvent::ToolUseDelta {
                    id: tool_use.id,
                    input_json: tool_use.input.to_string(),
                });
                events.push(ModelStreamEvent::BlockStop);
            }
            other => events.push(ModelStreamEvent::Block(other)),
        }
    }
    events.push(ModelStreamEvent::Stop {
        stop_reason: response.stop_reason,
        usage: response.usage,
    });
    events
}

#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    input_json: String,
}

#[derive(Debug)]
enum Pending {
    None,
    Text(String),
    Tool(PendingToolUse),
}

/// Folds stream events into the content blocks of one model turn.
#[derive(Debug)]
pub struct StreamAccumulator {
    blocks: Vec<ContentBlock>,
    pending: Pending,
    stop: Option<(StopReason, Usage)>,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self {
            blocks: Vec::new(),
            pending: Pending::None,
            stop: None,
        }
    }
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ModelStreamEvent) -> Result<(), OrbitError> {
        match event {
            ModelStreamEvent::TextDelta(delta) => match &mut self.pending {
                Pending::Text(text) => text.push_str(&delta),
                _ => {
                    self.flush();
                    self.pending = Pending::Text(delta);
                }
            },
            ModelStreamEvent::ToolUseStart { id, name } => {
                self.flush();
                self.pending = Pending::Tool(PendingToolUse {
                    id,
                    name,
                    input_json: String::new(),
                });
            }
            ModelStreamEvent::ToolUseDelta { id, input_json } => match &mut self.pending {
                Pending::Tool(tool) if tool.id == id => tool.input_json.push_str(&input_json),
                _ => {
                    return Err(OrbitError::Stream(format!(
                        "input delta for tool use '{id}' outside its block"
                    )))
                }
            },
            ModelStreamEvent::Block(block) => {
                self.flush();
                self.blocks.push(block);
            }
            ModelStreamEvent::BlockStop => match std::mem::replace(&mut self.pending, Pending::None)
            {
                Pending::Text(text) => self.blocks.push(ContentBlock::Text(text)),
                other => {
                    self.pending = other;
                    self.flush();
                }
            },
            ModelStreamEvent::Stop { stop_reason, usage } => {
                self.flush();
                self.stop = Some((stop_reason, usage));
            }
        }
        Ok(())
    }

    fn flush(&mut self) {
        match std::mem::replace(&mut self.pending, Pending::None) {
            Pending::None => {}
            Pending::Text(text) => {
                if !text.is_empty() {
                    self.blocks.push(ContentBlock::Text(text));
                }
            }
            Pending::Tool(tool) => {
                let raw = tool.input_json.trim();
                let input = if raw.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(raw)
                        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
                };
                self.blocks
                    .push(ContentBlock::ToolUse(ToolUse::new(tool.id, tool.name, input)));
            }
        }
    }

    /// Finish the turn. A stream that never reported a stop is an error.
    pub fn finish(mut self) -> Result<ModelResponse, OrbitError> {
        self.flush();
        let (stop_reason, usage) = self
            .stop
            .ok_or_else(|| OrbitError::Stream("model stream ended without a stop event".into()))?;
        Ok(ModelResponse::new(self.blocks, stop_reason).with_usage(usage))
    }
}
