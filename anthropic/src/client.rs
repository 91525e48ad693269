//! Anthropic API client implementation.

use std::sync::Arc;

use async_trait::async_trait;
use mnema_core::{GenerateOptions, LanguageModel, Message, Result};
use tracing::debug;

use crate::constant::{
    ANTHROPIC_BASE_URL, ANTHROPIC_VERSION, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, USER_AGENT,
};
use crate::error::AnthropicError;
use crate::request::MessagesRequest;
use crate::response::{MessagesResponse, error_message};

/// Chat model client for the Anthropic Messages API.
#[derive(Clone, Debug)]
pub struct Anthropic {
    inner: Arc<Config>,
}

#[derive(Clone, Debug)]
struct Config {
    api_key: String,
    base_url: String,
    model: String,
    default_max_tokens: u32,
    http: reqwest::Client,
}

impl Config {
    fn request_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

impl Anthropic {
    /// Create a new client using the provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::builder(api_key).build()
    }

    /// Start building a client with custom configuration.
    #[must_use]
    pub fn builder(api_key: impl Into<String>) -> Builder {
        Builder::new(api_key)
    }

    /// Override the default model in-place.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.inner).model = sanitize_model(model);
        self
    }

    /// Override the base URL (useful for proxies).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.inner).base_url = base_url.into();
        self
    }

    /// Override the default `max_tokens`.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        Arc::make_mut(&mut self.inner).default_max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl LanguageModel for Anthropic {
    async fn generate_with_messages(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<String> {
        const OP: &str = "anthropic.chat";

        let config = &self.inner;
        let body =
            MessagesRequest::new(&config.model, config.default_max_tokens, messages, options);
        debug!(model = %config.model, messages = messages.len(), "messages request");

        let response = config
            .http
            .post(config.request_url("/v1/messages"))
            .header("x-api-key", &config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&body)
            .send()
            .await
            .map_err(|err| AnthropicError::from(err).into_llm_error(OP))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnthropicError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            }
            .into_llm_error(OP));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|err| AnthropicError::from(err).into_llm_error(OP))?;

        let text = parsed.into_text();
        if text.is_empty() {
            return Err(
                AnthropicError::MissingData("response contained no text blocks".into())
                    .into_llm_error(OP),
            );
        }
        Ok(text)
    }
}

/// Builder for [`Anthropic`] clients.
#[derive(Debug)]
pub struct Builder {
    api_key: String,
    base_url: String,
    model: String,
    default_max_tokens: u32,
}

impl Builder {
    fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            default_max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Set a custom API base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Select a model identifier.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = sanitize_model(model);
        self
    }

    /// Set the default `max_tokens` for requests.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    /// Finalize the client.
    #[must_use]
    pub fn build(self) -> Anthropic {
        Anthropic {
            inner: Arc::new(Config {
                api_key: self.api_key,
                base_url: self.base_url,
                model: self.model,
                default_max_tokens: self.default_max_tokens,
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
    fn builder_defaults() {
        let client = Anthropic::new("key");
        assert_eq!(client.inner.base_url, ANTHROPIC_BASE_URL);
        assert_eq!(client.inner.model, DEFAULT_MODEL);
        assert_eq!(client.inner.default_max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn overrides_apply() {
        let client = Anthropic::new("key")
            .with_model(" claude-sonnet-4-5 ")
            .with_max_tokens(128);
        assert_eq!(client.inner.model, "claude-sonnet-4-5");
        assert_eq!(client.inner.default_max_tokens, 128);
    }
}
