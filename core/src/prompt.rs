//! Dynamic message shapes accepted by the write pipeline.

use serde::{Deserialize, Serialize};

use crate::llm::{Message, Role};

/// Input accepted by ingestion: a bare string, a single message, or an
/// ordered conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    /// A free-form utterance.
    Text(String),
    /// A single role-tagged record.
    Message(Message),
    /// An ordered sequence of records.
    Conversation(Vec<Message>),
}

impl Prompt {
    /// Renders the prompt as conversation text.
    ///
    /// System messages are dropped; remaining messages are emitted as
    /// `role: content` lines in order.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Message(message) => render_messages(core::slice::from_ref(message)),
            Self::Conversation(messages) => render_messages(messages),
        }
    }

    /// True when rendering would produce no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Message(message) => {
                message.role() == Role::System || message.content().trim().is_empty()
            }
            Self::Conversation(messages) => messages
                .iter()
                .all(|m| m.role() == Role::System || m.content().trim().is_empty()),
        }
    }
}

fn render_messages(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        if message.role() == Role::System {
            continue;
        }
        let role = match message.role() {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => unreachable!(),
        };
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(role);
        out.push_str(": ");
        out.push_str(message.content());
    }
    out
}

impl From<String> for Prompt {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Prompt {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Message> for Prompt {
    fn from(value: Message) -> Self {
        Self::Message(value)
    }
}

impl From<Vec<Message>> for Prompt {
    fn from(value: Vec<Message>) -> Self {
        Self::Conversation(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_conversation_without_system_messages() {
        let prompt = Prompt::Conversation(vec![
            Message::system("You are terse."),
            Message::user("I moved to Berlin"),
            Message::assistant("Noted!"),
        ]);
        assert_eq!(prompt.render(), "user: I moved to Berlin\nassistant: Noted!");
    }

    #[test]
    fn bare_text_renders_verbatim() {
        let prompt = Prompt::from("User likes Python");
        assert_eq!(prompt.render(), "User likes Python");
    }

    #[test]
    fn emptiness() {
        assert!(Prompt::from("   ").is_empty());
        assert!(Prompt::Conversation(vec![Message::system("sys")]).is_empty());
        assert!(!Prompt::Message(Message::user("hi")).is_empty());
        assert!(Prompt::Conversation(Vec::new()).is_empty());
    }

    #[test]
    fn untagged_serde_accepts_all_shapes() {
        let text: Prompt = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(text, Prompt::Text("hello".into()));

        let single: Prompt =
            serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(single, Prompt::Message(Message::user("hi")));

        let many: Prompt =
            serde_json::from_str(r#"[{"role":"user","content":"hi"}]"#).unwrap();
        assert_eq!(many, Prompt::Conversation(vec![Message::user("hi")]));
    }
}
