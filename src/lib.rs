//! Orbit: a cooperative agent execution loop.
//!
//! An [`agent::Agent`] repeatedly calls a model, runs the tools it asks
//! for, lets hooks observe or pause each lifecycle stage, and keeps the
//! conversation inside the provider's context window.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use orbit::prelude::*;
//!
//! # async fn example(model: Arc<dyn ModelProvider>) -> orbit::error::Result<()> {
//! let agent = Agent::builder().model(model).build();
//! let result = agent.invoke("Hello!").await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod conversation;
pub mod error;
pub mod hooks;
pub mod prelude;
pub mod provider;
pub mod session;
pub mod tools;
pub mod types;
