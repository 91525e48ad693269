//! Endpoint and model defaults.

/// Anthropic REST endpoint.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
/// Version header required by the Messages API.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Default model.
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
/// Default `max_tokens` when the caller does not set one.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

pub(crate) const USER_AGENT: &str = "mnema-anthropic/0.1";
