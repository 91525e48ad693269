//! LLM adjudication of new facts against existing memories.

use std::sync::Arc;

use mnema_core::{GenerateOptions, LanguageModel, MemoryError, Message, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::parse::extract_json_object;

const DECISION_SYSTEM_PROMPT: &str = "\
You are the curator of a memory database. You compare newly extracted facts \
against existing memories and decide, for each piece of information, exactly \
one operation:

- ADD: the fact is new; no existing memory covers it.
- UPDATE: an existing memory covers the same subject but the fact refines or \
corrects it. Use the existing memory's id and return the merged text.
- DELETE: the fact contradicts an existing memory that must be removed. Use \
the existing memory's id.
- NONE: the fact is already fully captured, or carries nothing worth storing.

Return only JSON of the form \
{\"memory\": [{\"id\": \"0\", \"text\": \"...\", \"event\": \"UPDATE\", \
\"old_memory\": \"...\"}]}. Use the ids exactly as given. Include \
\"old_memory\" only for UPDATE.";

/// An existing memory rendered for adjudication, keyed by a positional
/// temp id the caller translates back to a real id.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateMemory {
    /// Positional identifier handed to the model.
    pub id: String,
    /// Memory content.
    pub text: String,
}

/// Write-plan events the model may choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryEvent {
    /// Insert a new memory.
    Add,
    /// Rewrite an existing memory.
    Update,
    /// Remove an existing memory.
    Delete,
    /// Leave everything untouched.
    None,
}

impl MemoryEvent {
    /// Parses the (case-insensitive) wire form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "ADD" => Some(Self::Add),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            "NONE" => Some(Self::None),
            _ => None,
        }
    }

    /// Wire form of the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::None => "NONE",
        }
    }
}

/// One normalised action of the write plan.
#[derive(Debug, Clone)]
pub struct MemoryAction {
    /// Temp id of the targeted memory; meaningful for UPDATE and DELETE.
    pub id: Option<String>,
    /// Memory text; the fact for ADD, the merged text for UPDATE.
    pub text: String,
    /// Chosen operation.
    pub event: MemoryEvent,
    /// Content being replaced, as reported by the model on UPDATE.
    pub old_memory: Option<String>,
}

/// Prompts the language model for an ADD/UPDATE/DELETE/NONE plan.
#[derive(Clone)]
pub struct DecisionMaker {
    llm: Arc<dyn LanguageModel>,
}

impl core::fmt::Debug for DecisionMaker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DecisionMaker").finish_non_exhaustive()
    }
}

impl DecisionMaker {
    /// Creates a decision maker over the shared chat client.
    #[must_use]
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Produces a normalised plan for `facts` against `existing` memories.
    pub async fn decide(
        &self,
        facts: &[String],
        existing: &[CandidateMemory],
    ) -> Result<Vec<MemoryAction>> {
        const OP: &str = "decide_memory_actions";

        if facts.is_empty() {
            return Ok(Vec::new());
        }

        let user_prompt = format!(
            "Existing memories:\n{existing}\n\nNew facts:\n{facts}",
            existing = serde_json::to_string_pretty(existing)
                .map_err(|err| MemoryError::llm(OP, "failed to encode existing memories")
                    .with_source(err))?,
            facts = serde_json::to_string_pretty(facts)
                .map_err(|err| MemoryError::llm(OP, "failed to encode facts").with_source(err))?,
        );
        let messages = [
            Message::system(DECISION_SYSTEM_PROMPT),
            Message::user(user_prompt),
        ];

        let reply = self
            .llm
            .generate_with_messages(&messages, &GenerateOptions::new().with_temperature(0.0))
            .await
            .map_err(|err| err.in_op(OP))?;

        let actions = parse_actions(OP, &reply)?;
        debug!(count = actions.len(), "write plan received");
        Ok(actions)
    }
}

fn parse_actions(op: &str, reply: &str) -> Result<Vec<MemoryAction>> {
    let value = extract_json_object(reply)
        .ok_or_else(|| MemoryError::llm(op, "decision reply is not a JSON object"))?;

    let Some(items) = value.get("memory").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut actions = Vec::with_capacity(items.len());
    for item in items {
        let Some(event) = item
            .get("event")
            .and_then(Value::as_str)
            .and_then(MemoryEvent::parse)
        else {
            warn!(item = %item, "dropping plan item with unknown event");
            continue;
        };

        // `text` and `memory` are interchangeable on the wire.
        let text = item
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| item.get("memory").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        let id = match item.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        let old_memory = item
            .get("old_memory")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        actions.push(MemoryAction {
            id,
            text,
            event,
            old_memory,
        });
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_parsing_upper_cases() {
        assert_eq!(MemoryEvent::parse("add"), Some(MemoryEvent::Add));
        assert_eq!(MemoryEvent::parse("Update"), Some(MemoryEvent::Update));
        assert_eq!(MemoryEvent::parse("DELETE"), Some(MemoryEvent::Delete));
        assert_eq!(MemoryEvent::parse("none"), Some(MemoryEvent::None));
        assert_eq!(MemoryEvent::parse("MERGE"), None);
    }

    #[test]
    fn parses_documented_shape() {
        let reply = r#"{"memory": [
            {"id": "0", "text": "User is 29 years old", "event": "UPDATE",
             "old_memory": "User is 28 years old"},
            {"text": "User lives in Berlin", "event": "ADD"}
        ]}"#;
        let actions = parse_actions("decide", reply).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].event, MemoryEvent::Update);
        assert_eq!(actions[0].id.as_deref(), Some("0"));
        assert_eq!(
            actions[0].old_memory.as_deref(),
            Some("User is 28 years old")
        );
        assert_eq!(actions[1].event, MemoryEvent::Add);
        assert!(actions[1].id.is_none());
    }

    #[test]
    fn memory_field_is_a_text_fallback() {
        let reply = r#"{"memory": [{"memory": "User likes tea", "event": "add"}]}"#;
        let actions = parse_actions("decide", reply).unwrap();
        assert_eq!(actions[0].text, "User likes tea");
    }

    #[test]
    fn numeric_ids_are_stringified() {
        let reply = r#"{"memory": [{"id": 3, "event": "DELETE"}]}"#;
        let actions = parse_actions("decide", reply).unwrap();
        assert_eq!(actions[0].id.as_deref(), Some("3"));
    }

    #[test]
    fn unknown_events_are_dropped() {
        let reply = r#"{"memory": [
            {"event": "MERGE", "text": "x"},
            {"event": "NONE", "text": "y"}
        ]}"#;
        let actions = parse_actions("decide", reply).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].event, MemoryEvent::None);
    }

    #[test]
    fn missing_memory_key_is_an_empty_plan() {
        assert!(parse_actions("decide", "{}").unwrap().is_empty());
    }

    #[test]
    fn malformed_reply_is_an_llm_error() {
        let err = parse_actions("decide", "no plan").unwrap_err();
        assert_eq!(err.kind(), mnema_core::ErrorKind::LlmOperation);
    }
}
