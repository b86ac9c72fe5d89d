//! verdant-llm: Text-classification service abstraction.
//!
//! `backend` talks to the hosted models, `extraction` turns their free-form
//! replies into JSON, `pricing` converts token usage into money.

pub mod backend;
pub mod extraction;
pub mod pricing;

pub use backend::{AnthropicBackend, LlmBackend, LlmError, LlmRequest, LlmResponse, Message, OpenAiCompatibleBackend};
pub use extraction::{extract_json, ExtractError};
pub use pricing::TokenPricing;
