//! datastory-llm: completion backend abstraction used by the stage agents.
//!
//! A backend takes a chat-style request, optionally constrained to a JSON
//! schema, and returns the first choice's message content.

pub mod backend;
pub mod schema;

pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message, OpenAiCompatibleBackend};
pub use schema::ResponseFormat;
