use crate::config::{ApiType, LlmConfig};
use crate::error::{LlmError, Result};
use crate::stream::DeltaDecoder;
use crate::types::{ChatMessage, ChatRequest, ChatResponse, CompletionOptions, ResponseFormatSpec};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Request, Response};
use std::time::Duration;

/// Anything that can answer a chat conversation.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatMessage>;

    /// Like [`ChatCompletion::chat_completion`], but hands each piece of
    /// the reply to `on_delta` as it arrives. Returns the whole reply.
    ///
    /// The default delivers the complete reply as a single piece.
    async fn chat_completion_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<ChatMessage> {
        let message = self.chat_completion(messages, options).await?;
        on_delta(&message.content);
        Ok(message)
    }
}

/// HTTP client for OpenAI and Azure OpenAI chat completions.
///
/// Failures are returned as-is; callers decide whether to try again.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey("llm.api_key is empty".into()));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    #[must_use]
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Model a call with `options` is sent to.
    #[must_use]
    pub fn model_for(&self, options: &CompletionOptions) -> String {
        if options.use_backup_model {
            return self.config.backup_model.clone();
        }
        options
            .model
            .clone()
            .unwrap_or_else(|| self.config.model.clone())
    }

    #[must_use]
    pub fn endpoint(&self, model: &str) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        match self.config.api_type {
            ApiType::OpenAi => format!("{base}/chat/completions"),
            ApiType::Azure => format!(
                "{base}/openai/deployments/{model}/chat/completions?api-version={}",
                self.config.api_version
            ),
        }
    }

    /// Build the HTTP request without sending it.
    pub fn prepare(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<Request> {
        self.build_request(messages, options, false)
    }

    /// Build a request for a streamed (server-sent events) reply.
    pub fn prepare_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Request> {
        self.build_request(messages, options, true)
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        stream: bool,
    ) -> Result<Request> {
        let model = self.model_for(options);
        let response_format = options.response_format.unwrap_or(self.config.response_format);
        let body = ChatRequest {
            model: model.clone(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            frequency_penalty: options.frequency_penalty,
            presence_penalty: options.presence_penalty,
            stop: options.stop.clone(),
            seed: options.seed,
            response_format: ResponseFormatSpec {
                format_type: response_format.as_str(),
            },
            stream,
        };

        let builder = self.http.post(self.endpoint(&model)).json(&body);
        let builder = match self.config.api_type {
            ApiType::OpenAi => builder.bearer_auth(&self.config.api_key),
            ApiType::Azure => builder.header("api-key", &self.config.api_key),
        };
        Ok(builder.build()?)
    }

    async fn send(&self, request: Request) -> Result<Response> {
        log::debug!("Sending chat completion to {}", request.url());
        let response = self.http.execute(request).await?;
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            log::warn!("Chat completion rate limited (retry after {retry_after:?}s)");
            return Err(LlmError::RateLimited { retry_after });
        }

        if status >= 400 {
            let body = response.text().await.unwrap_or_else(|_| "(no body)".into());
            return Err(LlmError::ApiError {
                status,
                message: body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatCompletion for LlmClient {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatMessage> {
        let response = self.send(self.prepare(messages, options)?).await?;
        let resp: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {e}")))?;
        if let Some(usage) = resp.usage {
            log::debug!(
                "Chat completion used {} prompt and {} completion tokens",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        resp.into_message()
    }

    async fn chat_completion_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<ChatMessage> {
        let response = self.send(self.prepare_stream(messages, options)?).await?;

        let mut decoder = DeltaDecoder::new();
        let mut content = String::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            for delta in decoder.feed(&chunk?)? {
                on_delta(&delta);
                content.push_str(&delta);
            }
            if decoder.is_done() {
                break;
            }
        }
        for delta in decoder.finish()? {
            on_delta(&delta);
            content.push_str(&delta);
        }

        log::debug!("Streamed chat completion of {} bytes", content.len());
        Ok(ChatMessage::assistant(content))
    }
}
