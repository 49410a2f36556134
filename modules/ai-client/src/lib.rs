pub mod client;
pub mod schema;
pub mod types;
pub mod util;

pub use client::LlmClient;
pub use schema::StructuredOutput;
pub use types::{ChatMessage, ChatRequest, ChatResponse};
pub use util::{strip_code_blocks, truncate_to_char_boundary};
