use crate::roster::Shaping;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One chat-style completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub shaping: Shaping,
}

/// Token and cost accounting reported by the provider. Zero when absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub reasoning_tokens: u32,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    /// `None` when the provider returned no message content.
    pub text: Option<String>,
    pub usage: Usage,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> anyhow::Result<ChatReply>;
    fn provider_name(&self) -> &'static str;
}

pub mod fake;
pub mod openrouter;
