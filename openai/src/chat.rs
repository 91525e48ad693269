//! Chat completions over `/chat/completions`.

use async_trait::async_trait;
use mnema_core::{GenerateOptions, LanguageModel, Message, Result};
use tracing::debug;

use crate::client::OpenAI;
use crate::constant::USER_AGENT;
use crate::error::OpenAIError;
use crate::request::ChatCompletionRequest;
use crate::response::{ChatCompletionResponse, error_message};

#[async_trait]
impl LanguageModel for OpenAI {
    async fn generate_with_messages(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<String> {
        const OP: &str = "openai.chat";

        let config = self.config();
        let body = ChatCompletionRequest::new(&config.chat_model, messages, options);
        debug!(model = %config.chat_model, messages = messages.len(), "chat completion request");

        let mut builder = config
            .http
            .post(config.request_url("/chat/completions"))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&body);
        if !config.api_key.is_empty() {
            builder = builder.header(reqwest::header::AUTHORIZATION, config.request_auth());
        }
        if let Some(organization) = &config.organization {
            builder = builder.header("OpenAI-Organization", organization);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| OpenAIError::from(err).into_llm_error(OP))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenAIError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            }
            .into_llm_error(OP));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| OpenAIError::from(err).into_llm_error(OP))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                OpenAIError::MissingData("completion response contained no choices".into())
                    .into_llm_error(OP)
            })
    }
}
