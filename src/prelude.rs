//! Convenience re-exports for common use.

pub use crate::agent::Agent;
pub use crate::agent_loop::{AgentResult, Checkpoint, LoopEvent, ToolExecutionMode};
pub use crate::config::LoopConfig;
pub use crate::conversation::{ConversationManagerConfig, ConversationStrategy, Summarizer};
pub use crate::error::{OrbitError, Result};
pub use crate::hooks::{HookContext, HookError, HookEvent, HookRegistry, InterruptResponse};
pub use crate::provider::{ModelProvider, ModelRequest, ModelResponse};
pub use crate::session::{InMemorySessionStore, SessionStore};
pub use crate::tools::{AgentTool, AgentToolParameters, StaticToolRegistry, Tool, ToolArguments};
pub use crate::types::{ContentBlock, Message, Role, StopReason, ToolResult, ToolUse};
