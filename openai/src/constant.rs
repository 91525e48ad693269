//! Endpoint and model defaults.

/// OpenAI REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// DashScope's OpenAI-compatible endpoint for Qwen models.
pub const QWEN_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
/// DeepSeek's OpenAI-compatible endpoint.
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
/// Local Ollama endpoint in OpenAI-compatible mode.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Dimension of [`DEFAULT_EMBEDDING_MODEL`].
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Default Qwen chat model.
pub const QWEN_DEFAULT_MODEL: &str = "qwen-plus";
/// Default Qwen embedding model.
pub const QWEN_DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-v3";
/// Dimension of [`QWEN_DEFAULT_EMBEDDING_MODEL`].
pub const QWEN_DEFAULT_EMBEDDING_DIM: usize = 1024;

pub(crate) const USER_AGENT: &str = "mnema-openai/0.1";
