//! Agent execution loop: cycles, tool batches, metrics and checkpoints.

pub mod checkpoint;
pub mod events;
pub mod metrics;
pub(crate) mod runner;
pub mod tooling;
pub mod types;

pub use checkpoint::{Checkpoint, LoopStage, ToolProgress, ToolState};
pub use events::{LoopEvent, LoopEventSink};
pub use metrics::{EventLoopMetrics, ToolExecutionRecord, ToolMetrics, ToolOutcome};
pub use tooling::ToolExecutionMode;
pub use types::{AgentResult, ToolExecutionSummary};
