//! Agent entry point and per-agent state.

pub mod agent;
pub mod guard;
pub mod state;

pub use agent::Agent;
pub use guard::{InvocationGuard, InvocationPermit};
pub use state::AgentState;
