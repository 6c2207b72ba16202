//! Rolling conversation window

use std::collections::VecDeque;

use super::{ChatMessage, Role};

/// In-memory history of the last `max_history` exchanges
#[derive(Debug, Clone)]
pub struct Conversation {
    system_prompt: Option<String>,
    history: VecDeque<ChatMessage>,
    max_messages: usize,
}

impl Conversation {
    /// Keep at most `max_history` user/assistant exchanges
    #[must_use]
    pub fn new(max_history: usize, system_prompt: Option<String>) -> Self {
        let max_messages = max_history.saturating_mul(2);
        Self {
            system_prompt,
            history: VecDeque::with_capacity(max_messages),
            max_messages,
        }
    }

    /// Append a transcribed user message
    pub fn add_user(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::new(Role::User, content));
    }

    /// Append an assistant reply
    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::new(Role::Assistant, content));
    }

    fn push(&mut self, message: ChatMessage) {
        if self.max_messages == 0 {
            return;
        }
        while self.history.len() >= self.max_messages {
            self.history.pop_front();
        }
        self.history.push_back(message);
    }

    /// Messages for the chat model, system prompt first
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.system_prompt
            .iter()
            .map(|prompt| ChatMessage::new(Role::System, prompt.clone()))
            .chain(self.history.iter().cloned())
            .collect()
    }

    /// Replace the system prompt
    pub fn set_system_prompt(&mut self, prompt: Option<String>) {
        self.system_prompt = prompt;
    }

    /// Drop all history, keeping the system prompt
    pub fn clear(&mut self) {
        self.history.clear();
        tracing::debug!("conversation history cleared");
    }

    /// Messages held, excluding the system prompt
    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// True when no exchange has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
