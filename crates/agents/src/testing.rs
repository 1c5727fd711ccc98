//! Scripted [`ChatCompletion`] for exercising agents without a model.

use async_trait::async_trait;
use codeplan_llm::{ChatCompletion, ChatMessage, CompletionOptions, LlmError, ResponseFormat};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Chat completion double that answers from a fixed script and records
/// every conversation it was sent, with the response format asked for.
///
/// Runs out with [`LlmError::InvalidResponse`] once the script is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    formats: Mutex<Vec<Option<ResponseFormat>>>,
}

impl ScriptedLlm {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Conversations received so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.requests).clone()
    }

    /// Response format override of each request, oldest first.
    pub fn formats(&self) -> Vec<Option<ResponseFormat>> {
        lock(&self.formats).clone()
    }

    /// Replies not consumed yet.
    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl ChatCompletion for ScriptedLlm {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> codeplan_llm::Result<ChatMessage> {
        lock(&self.requests).push(messages.to_vec());
        lock(&self.formats).push(options.response_format);
        lock(&self.replies)
            .pop_front()
            .map(ChatMessage::assistant)
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".into()))
    }
}
