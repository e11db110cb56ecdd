use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Output budget used when a prompt is built from a bare string.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// A rendered request: role-tagged messages plus generation bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct Prompt {
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl Prompt {
    /// Single user message. `max_tokens` is clamped to at least 1.
    #[must_use]
    pub fn new(user: impl Into<String>, max_tokens: u32) -> Self {
        Self::from_messages(vec![Message::user(user)], max_tokens)
    }

    #[must_use]
    pub fn from_messages(messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            messages,
            max_tokens: max_tokens.max(1),
            temperature: None,
        }
    }

    /// Prepend a system instruction.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.messages.insert(0, Message::system(system));
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// All system messages joined by a blank line, or `None` when there are none.
    #[must_use]
    pub fn system_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Non-system messages in order.
    pub fn conversation(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }
}

impl From<String> for Prompt {
    fn from(user: String) -> Self {
        Self::new(user, DEFAULT_MAX_TOKENS)
    }
}

impl From<&str> for Prompt {
    fn from(user: &str) -> Self {
        Self::new(user, DEFAULT_MAX_TOKENS)
    }
}

pub trait LlmProvider: Send + Sync {
    /// Send the prompt and return the generated text with the provider
    /// envelope removed.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::CompletionFailed`] on transport failures and on
    /// provider error responses. No retry is attempted.
    fn complete(&self, prompt: &Prompt) -> impl Future<Output = Result<String, LlmError>> + Send;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_tokens_is_clamped() {
        assert_eq!(Prompt::new("hi", 0).max_tokens, 1);
        assert_eq!(Prompt::new("hi", 500).max_tokens, 500);
    }

    #[test]
    fn system_is_prepended() {
        let prompt = Prompt::new("question", 10).with_system("rules");
        assert_eq!(prompt.messages[0].role, Role::System);
        assert_eq!(prompt.system_text().as_deref(), Some("rules"));
        let conv: Vec<_> = prompt.conversation().collect();
        assert_eq!(conv.len(), 1);
        assert_eq!(conv[0].content, "question");
    }

    #[test]
    fn multiple_system_messages_join() {
        let prompt = Prompt::from_messages(
            vec![
                Message::system("a"),
                Message::system("b"),
                Message::user("c"),
            ],
            10,
        );
        assert_eq!(prompt.system_text().as_deref(), Some("a\n\nb"));
    }

    #[test]
    fn plain_string_is_single_user_message() {
        let prompt = Prompt::from("hello");
        assert_eq!(prompt.messages, vec![Message::user("hello")]);
        assert_eq!(prompt.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(prompt.temperature.is_none());
        assert!(prompt.system_text().is_none());
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
