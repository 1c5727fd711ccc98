use std::collections::VecDeque;

/// Message passed between agents. Sender and receiver are agent names,
/// stamped on delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub content: String,
}

impl Message {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            sender: None,
            receiver: None,
            content: content.into(),
        }
    }

    /// A reply addressed back to this message's sender.
    #[must_use]
    pub fn reply(&self, content: impl Into<String>) -> Self {
        Self {
            sender: self.receiver.clone(),
            receiver: self.sender.clone(),
            content: content.into(),
        }
    }
}

/// FIFO inbox.
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    messages: VecDeque<Message>,
}

impl MessageQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.messages.pop_front()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_fifo() {
        let mut queue = MessageQueue::new();
        assert!(queue.pop().is_none());

        queue.push(Message::new("first"));
        queue.push(Message::new("second"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().content, "first");
        assert_eq!(queue.pop().unwrap().content, "second");
        assert!(queue.is_empty());
    }

    #[test]
    fn reply_swaps_endpoints() {
        let message = Message {
            sender: Some("human".into()),
            receiver: Some("code_planner".into()),
            content: "plan a calculator".into(),
        };
        let reply = message.reply("Step 1: ...");
        assert_eq!(reply.sender.as_deref(), Some("code_planner"));
        assert_eq!(reply.receiver.as_deref(), Some("human"));
    }
}
