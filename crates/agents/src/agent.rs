use crate::error::Result;
use crate::message::{Message, MessageQueue};
use async_trait::async_trait;
use codeplan_llm::ChatCompletion;

/// An LLM-backed participant that works through an inbox of messages.
#[async_trait]
pub trait Agent: Send {
    fn name(&self) -> &str;

    fn inbox(&mut self) -> &mut MessageQueue;

    /// Queue a message, stamping this agent as its receiver.
    fn receive(&mut self, mut message: Message) {
        message.receiver = Some(self.name().to_string());
        self.inbox().push(message);
    }

    /// Drain the inbox, returning one reply per handled message.
    async fn process_messages(&mut self, llm: &dyn ChatCompletion) -> Result<Vec<Message>>;
}

/// Deliver `message` from `sender` to `to`.
pub fn send<A: Agent + ?Sized>(sender: &str, to: &mut A, mut message: Message) {
    message.sender = Some(sender.to_string());
    log::debug!("{sender} -> {}: {} bytes", to.name(), message.content.len());
    to.receive(message);
}
