//! # mnema-openai
//!
//! OpenAI-compatible provider for the mnema memory engine: chat completions
//! via `/chat/completions` and embeddings via `/embeddings`.
//!
//! The same client speaks to every OpenAI-compatible endpoint the engine
//! supports; dedicated constructors select the base URL:
//!
//! ```ignore
//! use mnema_openai::OpenAI;
//!
//! let openai = OpenAI::new(std::env::var("OPENAI_API_KEY")?);
//! let qwen = OpenAI::qwen(std::env::var("DASHSCOPE_API_KEY")?);
//! let deepseek = OpenAI::deepseek(std::env::var("DEEPSEEK_API_KEY")?);
//! let local = OpenAI::ollama().with_model("llama3.1");
//! ```

mod chat;
mod client;
mod constant;
mod embedding;
mod error;
mod request;
mod response;

pub use client::{Builder, OpenAI};
pub use constant::{
    DEEPSEEK_BASE_URL, DEFAULT_BASE_URL, DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_MODEL, OLLAMA_BASE_URL, QWEN_BASE_URL, QWEN_DEFAULT_EMBEDDING_MODEL,
    QWEN_DEFAULT_MODEL,
};
pub use error::OpenAIError;
