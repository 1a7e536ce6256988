//! Superuser request handling.
//!
//! A request is validated and resolved at intake, then driven by a per-prompt
//! task until it is decided, persisted, and answered exactly once.

mod handler;
mod types;

pub use handler::{EngineDeps, PromptController, PromptHandle, RequestHandler};
pub use types::{
    PromptEvent, PromptOutcome, PromptState, PromptView, RequestError, ResponseChannel, SuRequest,
    SuResponse,
};
