//! Interrupt tokens and the registry that tracks them across resumes.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrbitError;

/// A pause raised by a hook handler, awaiting a caller response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub reason: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

impl Interrupt {
    /// Deterministic identity: the same handler asking the same question at
    /// the same point of the same invocation always yields the same id.
    pub fn id_for(event_key: &str, name: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{event_key}:{name}").as_bytes()).to_string()
    }
}

/// A caller's answer to one interrupt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptResponse {
    pub interrupt_id: String,
    pub response: serde_json::Value,
}

impl InterruptResponse {
    pub fn new(interrupt_id: impl Into<String>, response: serde_json::Value) -> Self {
        Self {
            interrupt_id: interrupt_id.into(),
            response,
        }
    }
}

/// What a call to [`InterruptRegistry::apply_responses`] means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDisposition {
    /// Responses recorded; the suspended invocation should continue.
    Resume,
    /// Every id was answered by an earlier resume that already ran to completion.
    AlreadyApplied,
}

/// Pending interrupts plus the responses supplied for them.
///
/// Responses stay available for the whole logical invocation so a handler
/// re-running after resume receives its answer instead of raising again.
/// Every invocation gets a fresh id that is folded into interrupt
/// identities, so an answer meant for one invocation never matches another.
#[derive(Debug, Clone, Default)]
pub struct InterruptRegistry {
    invocation_id: String,
    pending: Vec<Interrupt>,
    responses: HashMap<String, serde_json::Value>,
    consumed: HashSet<String>,
}

impl InterruptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new logical invocation.
    ///
    /// Ids consumed by the previous invocation are kept so a repeated resume
    /// of it is still recognized.
    pub fn begin_invocation(&mut self) {
        self.invocation_id = Uuid::new_v4().to_string();
        self.pending.clear();
        self.responses.clear();
    }

    /// Adopt a suspended invocation restored from a checkpoint.
    pub fn restore(&mut self, invocation_id: impl Into<String>, pending: Vec<Interrupt>) {
        self.reset();
        self.invocation_id = invocation_id.into();
        self.raise(pending);
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    /// Record interrupts raised by a dispatch. Identical ids are kept once.
    pub fn raise(&mut self, interrupts: impl IntoIterator<Item = Interrupt>) {
        for interrupt in interrupts {
            if !self.pending.iter().any(|p| p.id == interrupt.id) {
                self.pending.push(interrupt);
            }
        }
    }

    pub fn pending(&self) -> &[Interrupt] {
        &self.pending
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn responses(&self) -> &HashMap<String, serde_json::Value> {
        &self.responses
    }

    /// Accept caller responses for the pending interrupts.
    pub fn apply_responses(
        &mut self,
        responses: Vec<InterruptResponse>,
    ) -> Result<ResumeDisposition, OrbitError> {
        if self.pending.is_empty() {
            if !responses.is_empty()
                && responses
                    .iter()
                    .all(|r| self.consumed.contains(&r.interrupt_id))
            {
                return Ok(ResumeDisposition::AlreadyApplied);
            }
            return Err(OrbitError::InvalidState(
                "no interrupts are pending; nothing to resume".into(),
            ));
        }

        for response in &responses {
            let known = self.pending.iter().any(|p| p.id == response.interrupt_id)
                || self.responses.contains_key(&response.interrupt_id);
            if !known {
                return Err(OrbitError::InvalidArgument(format!(
                    "unknown interrupt id '{}'",
                    response.interrupt_id
                )));
            }
        }

        for response in responses {
            self.responses
                .insert(response.interrupt_id, response.response);
        }
        // Handlers re-raise whatever is still unanswered when the stage re-runs.
        self.pending.clear();
        Ok(ResumeDisposition::Resume)
    }

    /// Close out the logical invocation: its answered ids become the
    /// consumed set, replacing the previous invocation's.
    pub fn complete(&mut self) {
        self.consumed = self.responses.drain().map(|(id, _)| id).collect();
        self.pending.clear();
    }

    /// Drop everything, including consumed ids.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.responses.clear();
        self.consumed.clear();
    }
}
