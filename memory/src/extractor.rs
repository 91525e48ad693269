//! Fact extraction from conversations.

use std::sync::Arc;

use mnema_core::{GenerateOptions, LanguageModel, MemoryError, Message, Prompt, Result};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::debug;

use crate::parse::extract_json_object;

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are a personal information organizer. You extract atomic, self-contained \
facts about the user from conversations: stable preferences, personal details, \
plans, relationships, and anything worth remembering across sessions.

Guidelines:
- Each fact must stand on its own without conversational context.
- Record who the fact is about and concrete details; resolve relative dates \
against today's date ({date}).
- Skip chit-chat, one-off requests, and assistant output that carries no \
information about the user.
- Do not infer facts that were not stated.

Return only JSON of the form {\"facts\": [\"fact one\", \"fact two\"]}. \
Return {\"facts\": []} when the conversation contains nothing worth keeping.";

/// Prompts the language model to distill a conversation into facts.
#[derive(Clone)]
pub struct FactExtractor {
    llm: Arc<dyn LanguageModel>,
}

impl core::fmt::Debug for FactExtractor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FactExtractor").finish_non_exhaustive()
    }
}

impl FactExtractor {
    /// Creates an extractor over the shared chat client.
    #[must_use]
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Extracts an ordered list of atomic facts from the prompt.
    ///
    /// An empty prompt yields an empty list without a model call. A model
    /// reply that is not valid JSON fails with an
    /// [`LlmOperation`](mnema_core::ErrorKind::LlmOperation) error; a valid
    /// object without a `facts` key yields an empty list.
    pub async fn extract(&self, prompt: &Prompt) -> Result<Vec<String>> {
        const OP: &str = "extract_facts";

        if prompt.is_empty() {
            return Ok(Vec::new());
        }

        let messages = [
            Message::system(system_prompt(OffsetDateTime::now_utc())),
            Message::user(prompt.render()),
        ];
        let reply = self
            .llm
            .generate_with_messages(&messages, &GenerateOptions::new().with_temperature(0.0))
            .await
            .map_err(|err| err.in_op(OP))?;

        let facts = parse_facts(OP, &reply)?;
        debug!(count = facts.len(), "facts extracted");
        Ok(facts)
    }
}

fn system_prompt(now: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day]");
    let date = now.format(&format).unwrap_or_else(|_| "unknown".to_string());
    EXTRACTION_SYSTEM_PROMPT.replace("{date}", &date)
}

fn parse_facts(op: &str, reply: &str) -> Result<Vec<String>> {
    let value = extract_json_object(reply).ok_or_else(|| {
        MemoryError::llm(op, "extraction reply is not a JSON object")
    })?;

    let Some(items) = value.get("facts").and_then(serde_json::Value::as_array) else {
        return Ok(Vec::new());
    };

    Ok(items
        .iter()
        .filter_map(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|fact| !fact.is_empty())
        .map(ToString::to_string)
        .collect())
}
