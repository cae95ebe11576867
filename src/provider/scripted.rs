//! Deterministic provider that replays queued responses.
//!
//! Exercises the full loop without network access.

use crate::error::ProviderError;
use crate::provider::{
    ChatMessage, CompletionOptions, CompletionResponse, ModelProviderClient, TokenUsage,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A call seen by a [`ScriptedProvider`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub options: CompletionOptions,
}

impl RecordedCall {
    /// Concatenated content of every message in the call.
    pub fn prompt(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<String, ProviderError>>,
    calls: Vec<RecordedCall>,
}

/// Clones share the same queue and call log.
#[derive(Clone)]
pub struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
    model_name: String,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::empty();
        for response in responses {
            provider.push(response);
        }
        provider
    }

    pub fn empty() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            model_name: "scripted".to_string(),
            delay: None,
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, response: impl Into<String>) {
        self.lock().responses.push_back(Ok(response.into()));
    }

    pub fn push_error(&self, error: ProviderError) {
        self.lock().responses.push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn remaining(&self) -> usize {
        self.lock().responses.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ModelProviderClient for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let next = {
            let mut script = self.lock();
            script.calls.push(RecordedCall { messages, options });
            script.responses.pop_front()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let content = next.unwrap_or_else(|| {
            Err(ProviderError::Other(
                "Scripted provider has no responses left".to_string(),
            ))
        })?;

        Ok(CompletionResponse {
            content,
            model: self.model_name.clone(),
            usage: TokenUsage::default(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
