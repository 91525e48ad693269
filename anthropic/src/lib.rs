//! # mnema-anthropic
//!
//! Anthropic Messages API provider for the mnema memory engine.
//!
//! ```ignore
//! use mnema_anthropic::Anthropic;
//! use mnema_core::{GenerateOptions, LanguageModel};
//!
//! let client = Anthropic::new(std::env::var("ANTHROPIC_API_KEY")?);
//! let answer = client
//!     .generate("Summarize this note in one line.", &GenerateOptions::new())
//!     .await?;
//! ```

mod client;
mod constant;
mod error;
mod request;
mod response;

pub use client::{Anthropic, Builder};
pub use constant::{ANTHROPIC_BASE_URL, ANTHROPIC_VERSION, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
pub use error::AnthropicError;
