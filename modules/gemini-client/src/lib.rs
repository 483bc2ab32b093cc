mod client;
pub mod error;
mod session;
mod types;

pub use client::GeminiClient;
pub use error::{GeminiError, Result};
pub use session::{ChatSession, Reply};
pub use types::{Content, GenerationConfig, Part};
