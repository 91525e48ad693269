//! Wire payloads received from the API.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub(crate) choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub(crate) message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoiceMessage {
    #[serde(default)]
    pub(crate) content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingResponse {
    #[serde(default)]
    pub(crate) data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingItem {
    #[serde(default)]
    pub(crate) index: usize,
    pub(crate) embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub(crate) error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub(crate) message: String,
}

/// Extracts a human-readable message from an error body, falling back to
/// the raw text when the body is not the documented shape.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map_or_else(|_| body.to_string(), |parsed| parsed.error.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_error_shape() {
        let body = r#"{"error":{"message":"invalid api key","type":"auth"}}"#;
        assert_eq!(error_message(body), "invalid api key");
    }

    #[test]
    fn falls_back_to_raw_body() {
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }
}
