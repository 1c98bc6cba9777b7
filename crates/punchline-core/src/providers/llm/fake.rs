//! Scripted backend for tests and offline demos.

use super::{ChatReply, ChatRequest, CompletionBackend, Usage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

#[derive(Clone, Debug)]
pub enum FakeBehavior {
    Reply {
        text: String,
        delay: Duration,
        usage: Usage,
    },
    /// Waits for one permit on the gate before replying.
    Gated {
        text: String,
        gate: Arc<Semaphore>,
    },
    Fail {
        message: String,
        delay: Duration,
    },
    /// Returns a reply without message content.
    Empty,
    /// Never returns.
    Hang,
}

impl FakeBehavior {
    pub fn reply(text: &str) -> Self {
        FakeBehavior::Reply {
            text: text.to_string(),
            delay: Duration::ZERO,
            usage: Usage {
                prompt_tokens: 200,
                completion_tokens: 4,
                reasoning_tokens: 0,
                cost: 0.0001,
            },
        }
    }

    pub fn delayed(text: &str, delay: Duration) -> Self {
        match Self::reply(text) {
            FakeBehavior::Reply { text, usage, .. } => FakeBehavior::Reply { text, delay, usage },
            other => other,
        }
    }

    pub fn fail(message: &str) -> Self {
        FakeBehavior::Fail {
            message: message.to_string(),
            delay: Duration::ZERO,
        }
    }

    /// A gated reply plus the gate that releases it.
    pub fn gated(text: &str) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            FakeBehavior::Gated {
                text: text.to_string(),
                gate: gate.clone(),
            },
            gate,
        )
    }
}

const CANNED: &[&str] = &[
    "hot",
    "black",
    "with a few pumps of cream",
    "ground up and in the freezer",
    "strong enough to wake the neighbours",
    "overpriced but worth it",
];

/// Backend whose behaviour is scripted per model id. Models without a script
/// get a canned reply picked deterministically from the model and prompt.
#[derive(Default)]
pub struct FakeBackend {
    behaviors: Mutex<HashMap<String, FakeBehavior>>,
    calls: AtomicUsize,
    called_models: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, model: &str, behavior: FakeBehavior) -> Self {
        self.set(model, behavior);
        self
    }

    pub fn set(&self, model: &str, behavior: FakeBehavior) {
        self.behaviors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(model.to_string(), behavior);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn called_models(&self) -> Vec<String> {
        self.called_models
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn canned(model: &str, user: &str) -> String {
        let seed = model
            .bytes()
            .chain(user.bytes())
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        CANNED[seed % CANNED.len()].to_string()
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn chat(&self, req: &ChatRequest) -> anyhow::Result<ChatReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.called_models
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(req.model.clone());

        let behavior = self
            .behaviors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&req.model)
            .cloned();

        match behavior {
            None => Ok(ChatReply {
                text: Some(Self::canned(&req.model, &req.user)),
                usage: Usage {
                    prompt_tokens: 200,
                    completion_tokens: 5,
                    reasoning_tokens: 0,
                    cost: 0.0,
                },
            }),
            Some(FakeBehavior::Reply { text, delay, usage }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(ChatReply {
                    text: Some(text),
                    usage,
                })
            }
            Some(FakeBehavior::Gated { text, gate }) => {
                gate.acquire().await?.forget();
                Ok(ChatReply {
                    text: Some(text),
                    usage: Usage::default(),
                })
            }
            Some(FakeBehavior::Fail { message, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                anyhow::bail!(message)
            }
            Some(FakeBehavior::Empty) => Ok(ChatReply {
                text: None,
                usage: Usage::default(),
            }),
            Some(FakeBehavior::Hang) => std::future::pending().await,
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
