//! Wire payloads sent to the Messages API.

use mnema_core::{GenerateOptions, Message, Role};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct MessagesRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) max_tokens: u32,
    pub(crate) messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) top_p: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) stop_sequences: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicMessage<'a> {
    pub(crate) role: &'static str,
    pub(crate) content: &'a str,
}

/// Splits system messages out of the conversation: the Messages API takes
/// them as a top-level `system` field rather than in the message list.
pub(crate) fn to_anthropic_messages(
    messages: &[Message],
) -> (Option<String>, Vec<AnthropicMessage<'_>>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut converted = Vec::new();

    for message in messages {
        match message.role() {
            Role::System => system_parts.push(message.content()),
            Role::User => converted.push(AnthropicMessage {
                role: "user",
                content: message.content(),
            }),
            Role::Assistant => converted.push(AnthropicMessage {
                role: "assistant",
                content: message.content(),
            }),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, converted)
}

impl<'a> MessagesRequest<'a> {
    pub(crate) fn new(
        model: &'a str,
        default_max_tokens: u32,
        messages: &'a [Message],
        options: &GenerateOptions,
    ) -> Self {
        let (system, converted) = to_anthropic_messages(messages);
        Self {
            model,
            max_tokens: options.max_tokens.unwrap_or(default_max_tokens),
            messages: converted,
            system,
            temperature: options.temperature,
            top_p: options.top_p,
            stop_sequences: options.stop.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_lifted_out() {
        let messages = [
            Message::system("You extract facts."),
            Message::user("I like tea"),
            Message::system("Be terse."),
        ];
        let (system, converted) = to_anthropic_messages(&messages);
        assert_eq!(system.as_deref(), Some("You extract facts.\n\nBe terse."));
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].role, "user");
    }

    #[test]
    fn default_max_tokens_applies() {
        let messages = [Message::user("hi")];
        let request = MessagesRequest::new("claude", 4096, &messages, &GenerateOptions::new());
        assert_eq!(request.max_tokens, 4096);

        let request = MessagesRequest::new(
            "claude",
            4096,
            &messages,
            &GenerateOptions::new().with_max_tokens(64),
        );
        assert_eq!(request.max_tokens, 64);
    }
}
