//! Message history with a cached context-size estimate.

use serde::{Deserialize, Serialize};

use super::estimate::estimate_tokens;
use crate::types::Message;

/// Ordered conversation history.
///
/// Every mutation goes through a method that refreshes the token estimate,
/// so [`ConversationHistory::token_estimate`] is always current.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Message>", into = "Vec<Message>")]
pub struct ConversationHistory {
    messages: Vec<Message>,
    token_estimate: usize,
}

impl ConversationHistory {
    pub fn new(messages: Vec<Message>) -> Self {
        let token_estimate = estimate_tokens(&messages);
        Self {
            messages,
            token_estimate,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn token_estimate(&self) -> usize {
        self.token_estimate
    }

    /// Append a message, returning its index.
    pub fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.refresh();
        self.messages.len() - 1
    }

    /// Replace the whole history.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.refresh();
    }

    /// Remove and return the first `count` messages.
    pub fn drain_front(&mut self, count: usize) -> Vec<Message> {
        let count = count.min(self.messages.len());
        let removed = self.messages.drain(..count).collect();
        self.refresh();
        removed
    }

    /// Mutate messages in place.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut Vec<Message>) -> R) -> R {
        let out = f(&mut self.messages);
        self.refresh();
        out
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    fn refresh(&mut self) {
        self.token_estimate = estimate_tokens(&self.messages);
    }
}

impl From<Vec<Message>> for ConversationHistory {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}

impl From<ConversationHistory> for Vec<Message> {
    fn from(history: ConversationHistory) -> Self {
        history.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tracks_every_mutation() {
        let mut history = ConversationHistory::default();
        assert_eq!(history.token_estimate(), 0);

        history.push(Message::user("hello"));
        let after_push = history.token_estimate();
        assert!(after_push > 0);

        history.push(Message::assistant("a considerably longer reply than the prompt"));
        assert!(history.token_estimate() > after_push);

        history.drain_front(1);
        assert_eq!(history.token_estimate(), estimate_tokens(history.messages()));

        history.update(|messages| messages.clear());
        assert_eq!(history.token_estimate(), 0);
    }

    #[test]
    fn serializes_as_a_plain_message_list() {
        let history = ConversationHistory::new(vec![Message::user("hi")]);
        let value = serde_json::to_value(&history).unwrap();
        assert!(value.is_array());
        let back: ConversationHistory = serde_json::from_value(value).unwrap();
        assert_eq!(back, history);
    }
}
