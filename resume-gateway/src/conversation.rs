//! Conversation handles.
//!
//! A [`ChatModel`] binds a provider to a model name and generation settings;
//! [`ChatModel::start_chat`] hands out a fresh [`Conversation`] that owns the
//! accumulated turns of one thread.

use crate::provider::{ChatRequest, Message, Provider, ProviderError};
use resume_common::config::LlmConfig;
use resume_common::util::truncate_with_ellipsis;
use std::sync::Arc;

/// Factory for conversations against a single model.
#[derive(Clone)]
pub struct ChatModel {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<i64>,
}

impl ChatModel {
    /// Bind `provider` to the model and generation settings in `config`.
    pub fn new(provider: Arc<dyn Provider>, config: &LlmConfig) -> Self {
        if !provider.supports_model(&config.model) {
            tracing::warn!(
                provider = provider.name(),
                model = %config.model,
                known_models = ?provider.models(),
                "Configured model is not recognised by the provider"
            );
        }

        Self {
            provider,
            model: config.model.clone(),
            temperature: Some(config.temperature),
            max_tokens: Some(config.max_output_tokens),
        }
    }

    /// Model name used for every conversation started from this factory.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Start a conversation with empty history.
    pub fn start_chat(&self) -> Conversation {
        Conversation {
            model: self.clone(),
            history: Vec::new(),
        }
    }
}

/// Accumulated turns of one conversation thread.
///
/// Deliberately not `Clone`: each session entry owns exactly one.
pub struct Conversation {
    model: ChatModel,
    history: Vec<Message>,
}

impl Conversation {
    /// Send a user turn with the accumulated history and return the reply.
    ///
    /// History is only extended when the provider answers; a failed call
    /// leaves the conversation exactly as it was.
    pub async fn send_message(&mut self, text: impl Into<String>) -> Result<String, ProviderError> {
        let text = text.into();

        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(text.clone()));

        let request = ChatRequest {
            model: self.model.model.clone(),
            messages,
            max_tokens: self.model.max_tokens,
            temperature: self.model.temperature,
        };

        tracing::debug!(
            model = %self.model.model,
            turns = self.history.len(),
            prompt = %truncate_with_ellipsis(&text, 80),
            "Sending message"
        );

        let response = self.model.provider.chat(request).await?;

        tracing::debug!(
            provider = %response.provider,
            latency_ms = response.latency_ms,
            total_tokens = response.usage.total_tokens,
            "Received reply"
        );

        self.history.push(Message::user(text));
        self.history.push(Message::assistant(response.content.clone()));

        Ok(response.content)
    }

    /// Turns exchanged so far, oldest first.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Number of completed user/model exchanges.
    pub fn exchanges(&self) -> usize {
        self.history.len() / 2
    }
}
