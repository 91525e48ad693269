//! OpenAI-compatible API client.

use std::sync::Arc;

use crate::constant::{
    DEEPSEEK_BASE_URL, DEFAULT_BASE_URL, DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_MODEL, OLLAMA_BASE_URL, QWEN_BASE_URL, QWEN_DEFAULT_EMBEDDING_DIM,
    QWEN_DEFAULT_EMBEDDING_MODEL, QWEN_DEFAULT_MODEL,
};

/// Client for OpenAI-compatible chat and embedding endpoints.
///
/// Cloning is cheap; configuration is shared behind an `Arc` and
/// copy-on-write mutated by the `with_*` overrides.
#[derive(Clone, Debug)]
pub struct OpenAI {
    inner: Arc<Config>,
}

#[derive(Clone, Debug)]
pub(crate) struct Config {
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) chat_model: String,
    pub(crate) embedding_model: String,
    pub(crate) embedding_dimensions: usize,
    pub(crate) organization: Option<String>,
    pub(crate) http: reqwest::Client,
}

impl Config {
    pub(crate) fn request_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    pub(crate) fn request_auth(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

impl OpenAI {
    /// Create a new client for api.openai.com using the provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::builder(api_key).build()
    }

    /// Create a client for DashScope's OpenAI-compatible Qwen endpoint.
    pub fn qwen(api_key: impl Into<String>) -> Self {
        Self::builder(api_key)
            .base_url(QWEN_BASE_URL)
            .model(QWEN_DEFAULT_MODEL)
            .embedding_model(QWEN_DEFAULT_EMBEDDING_MODEL)
            .embedding_dimensions(QWEN_DEFAULT_EMBEDDING_DIM)
            .build()
    }

    /// Create a client for DeepSeek's OpenAI-compatible endpoint.
    pub fn deepseek(api_key: impl Into<String>) -> Self {
        Self::builder(api_key)
            .base_url(DEEPSEEK_BASE_URL)
            .model("deepseek-chat")
            .build()
    }

    /// Create a client for a local Ollama server (no API key required).
    #[must_use]
    pub fn ollama() -> Self {
        Self::builder(String::new()).base_url(OLLAMA_BASE_URL).build()
    }

    /// Start building a client with custom configuration.
    #[must_use]
    pub fn builder(api_key: impl Into<String>) -> Builder {
        Builder::new(api_key)
    }

    /// Override the default chat model in-place.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.inner).chat_model = sanitize_model(model);
        self
    }

    /// Override the REST base URL (useful for compatible endpoints).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.inner).base_url = base_url.into();
        self
    }

    /// Override the embeddings model identifier.
    #[must_use]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.inner).embedding_model = sanitize_model(model);
        self
    }

    /// Override the embedding dimension reported by the client.
    #[must_use]
    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        Arc::make_mut(&mut self.inner).embedding_dimensions = dimensions;
        self
    }

    /// Attach an OpenAI organization header to every request.
    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.inner).organization = Some(organization.into());
        self
    }

    pub(crate) fn config(&self) -> Arc<Config> {
        self.inner.clone()
    }
}

/// Builder for [`OpenAI`] clients.
#[derive(Debug)]
pub struct Builder {
    api_key: String,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    embedding_dimensions: usize,
    organization: Option<String>,
}

impl Builder {
    fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIM,
            organization: None,
        }
    }

    /// Set a custom API base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Select a chat model identifier.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = sanitize_model(model);
        self
    }

    /// Select an embedding model identifier.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = sanitize_model(model);
        self
    }

    /// Set the embedding dimension the client reports.
    #[must_use]
    pub const fn embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions;
        self
    }

    /// Attach an organization header to every request.
    #[must_use]
    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Finalize the client.
    #[must_use]
    pub fn build(self) -> OpenAI {
        OpenAI {
            inner: Arc::new(Config {
                api_key: self.api_key,
                base_url: self.base_url,
                chat_model: self.chat_model,
                embedding_model: self.embedding_model,
                embedding_dimensions: self.embedding_dimensions,
                organization: self.organization,
                http: reqwest::Client::new(),
            }),
        }
    }
}

fn sanitize_model(model: impl Into<String>) -> String {
    model.into().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_url_joins_without_double_slash() {
        let client = OpenAI::builder("sk-test")
            .base_url("https://example.com/v1/")
            .build();
        assert_eq!(
            client.config().request_url("/chat/completions"),
            "https://example.com/v1/chat/completions"
        );
    }

    #[test]
    fn qwen_constructor_selects_dashscope() {
        let client = OpenAI::qwen("key");
        let config = client.config();
        assert_eq!(config.base_url, QWEN_BASE_URL);
        assert_eq!(config.chat_model, QWEN_DEFAULT_MODEL);
        assert_eq!(config.embedding_dimensions, QWEN_DEFAULT_EMBEDDING_DIM);
    }

    #[test]
    fn with_model_trims() {
        let client = OpenAI::new("sk-test").with_model("  gpt-4o  ");
        assert_eq!(client.config().chat_model, "gpt-4o");
    }
}
