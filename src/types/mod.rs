//! Public types for the Mimir API.

mod embedding;
mod message;
mod query;

pub use embedding::Embedding;
pub use message::{Message, Role};
pub use query::{CacheQuery, ChatRequest, DEFAULT_SYSTEM_PROMPT};
