//! Wire payloads sent to the API.

use mnema_core::{GenerateOptions, Message, Role};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) messages: Vec<ChatMessagePayload<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) top_p: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) stop: Vec<String>,
    pub(crate) stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessagePayload<'a> {
    pub(crate) role: &'static str,
    pub(crate) content: &'a str,
}

pub(crate) fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessagePayload<'_>> {
    messages
        .iter()
        .map(|message| ChatMessagePayload {
            role: match message.role() {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: message.content(),
        })
        .collect()
}

impl<'a> ChatCompletionRequest<'a> {
    pub(crate) fn new(
        model: &'a str,
        messages: &'a [Message],
        options: &GenerateOptions,
    ) -> Self {
        Self {
            model,
            messages: to_chat_messages(messages),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            stop: options.stop.clone(),
            stream: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EmbeddingRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) input: &'a [String],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_map_to_wire_names() {
        let messages = [
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        let payload = to_chat_messages(&messages);
        assert_eq!(payload[0].role, "system");
        assert_eq!(payload[1].role, "user");
        assert_eq!(payload[2].role, "assistant");
    }

    #[test]
    fn optional_parameters_are_omitted() {
        let messages = [Message::user("hi")];
        let request = ChatCompletionRequest::new("gpt-4o-mini", &messages, &GenerateOptions::new());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("stop").is_none());
        assert_eq!(json["stream"], false);
    }
}
