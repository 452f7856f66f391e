//! Agent runtime for parley: turns one inbound message into a verified reply.
//!
//! # Flow
//!
//! 1. **Guardrails** (`guardrails`) normalize the message and redact
//!    prompt-injection phrasing.
//! 2. **Qualification** updates the conversation session (`parley_core`).
//! 3. **Prompting** (`prompt`) builds the per-language system prompt plus
//!    context blocks.
//! 4. **Orchestration** (`orchestrator`) walks the provider chain with
//!    throttle retries (`backoff`) and stream assembly (`stream`).
//! 5. **Supervision** (`supervision`) publishes the draft on the event bus
//!    (`bus`) and waits, bounded by a timeout, for the reviewer
//!    (`supervisor`).
//!
//! Total provider failure is reported as
//! [`OrchestrationResult::Failure`](orchestrator::OrchestrationResult), not as
//! an error: callers must branch on it.

pub mod backoff;
pub mod bus;
pub mod guardrails;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod runtime;
pub mod stream;
pub mod supervision;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{OrchestrationResult, Orchestrator, RespondOptions};
pub use runtime::{AgentRuntime, TurnOutcome};
pub use supervision::{SupervisionState, Supervisor, Verification};
