//! Wire payloads received from the Messages API.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    pub(crate) content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentBlock {
    /// Plain text block.
    Text {
        /// The text payload.
        text: String,
    },
    /// Anything else (tool use, thinking); ignored by this client.
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    /// Concatenates every text block in order.
    pub(crate) fn into_text(self) -> String {
        let mut out = String::new();
        for block in self.content {
            if let ContentBlock::Text { text } = block {
                out.push_str(&text);
            }
        }
        out
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub(crate) error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub(crate) message: String,
}

pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map_or_else(|_| body.to_string(), |parsed| parsed.error.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_text_blocks() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"Hello "},{"type":"text","text":"world"}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_text(), "Hello world");
    }

    #[test]
    fn skips_non_text_blocks() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"tool_use","id":"t1","name":"x","input":{}},{"type":"text","text":"ok"}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_text(), "ok");
    }
}
