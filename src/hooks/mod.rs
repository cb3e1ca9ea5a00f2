//! Lifecycle hooks and human-in-the-loop interrupts.

pub mod dispatcher;
pub mod events;
pub mod interrupts;

pub use dispatcher::{DispatchOutcome, FnHook, HookContext, HookError, HookHandler, HookRegistry};
pub use events::{HookEvent, HookStage};
pub use interrupts::{Interrupt, InterruptRegistry, InterruptResponse, ResumeDisposition};
