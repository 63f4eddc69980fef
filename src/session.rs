use crate::protocol::chat::{Message, Role};

/// Ordered chat history for one interactive session.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a conversation seeded with a system prompt. An empty prompt
    /// leaves the history empty.
    #[must_use]
    pub fn new(system_prompt: &str) -> Self {
        let mut messages = Vec::new();
        if !system_prompt.trim().is_empty() {
            messages.push(Message::system(system_prompt));
        }
        Self { messages }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Drop the trailing user turn, e.g. after its request failed.
    pub fn rollback_last_user(&mut self) -> Option<Message> {
        if self.messages.last().map(|message| message.role) == Some(Role::User) {
            return self.messages.pop();
        }
        None
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
