use crate::model::Completion;
use crate::providers::llm::{ChatRequest, CompletionBackend};
use crate::roster::BackendSpec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

pub const SYSTEM_PROMPT: &str = r#"
You are participating in an improv comedy game called "I like my women."
The user will give you a word or phrase to complete the sentence: "I like my women like I like my [their word]..."
Your goal is to be FUNNY. Use wordplay, double meanings, unexpected twists, or absurdist humor. Keep it short and punchy.
Try not to be an annoying moralist. This is just for fun!
Don't think too hard or spend too long thinking. Oftentimes less is more, and remember, brevity is the soul of wit!
IMPORTANT: Respond with ONLY the punchline/completion. Do NOT repeat the full sentence and do NOT use punctuation

Examples:
User: "I like my women like I like my coffee..."
You: "hot"

User: "I like my women like I like my coffee..."
You: "black"

User: "I like my women like I like my coffee..."
You: "with a few pumps of cream"

Just give the punchline. Nothing else.
"#;

/// Longest failure description kept in an error marker.
pub const MAX_ERROR_CHARS: usize = 100;

pub fn user_prompt(word: &str) -> String {
    format!("I like my women like I like my {}...", word)
}

/// Trims whitespace and surrounding quote characters.
pub fn clean_text(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim()
        .to_string()
}

pub fn error_marker(description: &str) -> String {
    let short: String = description.chars().take(MAX_ERROR_CHARS).collect();
    format!("[Error: {}]", short)
}

/// Calls one backend and always produces a completion, never an error.
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    timeout: Duration,
    max_tokens: u32,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, timeout: Duration, max_tokens: u32) -> Self {
        Self {
            backend,
            timeout,
            max_tokens,
        }
    }

    pub fn request_for(&self, spec: &BackendSpec, word: &str) -> ChatRequest {
        ChatRequest {
            model: spec.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            user: user_prompt(word),
            temperature: 0.0,
            max_tokens: self.max_tokens,
            shaping: spec.shaping,
        }
    }

    pub async fn complete(&self, spec: &BackendSpec, word: &str) -> Completion {
        let req = self.request_for(spec, word);
        let start = Instant::now();

        let result = match timeout(self.timeout, self.backend.chat(&req)).await {
            Ok(Ok(reply)) => match reply.text.as_deref().map(clean_text) {
                Some(text) if !text.is_empty() => Ok((text, reply.usage)),
                _ => Err("backend returned no content".to_string()),
            },
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err(format!("timed out after {}s", self.timeout.as_secs_f64())),
        };

        match result {
            Ok((text, usage)) => {
                let completion = Completion {
                    text,
                    failed: false,
                    latency_secs: start.elapsed().as_secs_f64(),
                    completion_tokens: usage.completion_tokens,
                    reasoning_tokens: usage.reasoning_tokens,
                    prompt_tokens: usage.prompt_tokens,
                    cost: usage.cost,
                };
                crate::usage::log_usage_event(&spec.name, &spec.model, &completion);
                completion
            }
            Err(description) => {
                tracing::warn!(
                    event = "completion.failed",
                    backend = %spec.name,
                    model = %spec.model,
                    provider = self.backend.provider_name(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    error = %description,
                );
                Completion {
                    text: error_marker(&description),
                    failed: true,
                    ..Completion::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::fake::{FakeBackend, FakeBehavior};
    use crate::roster::Shaping;

    fn spec(model: &str) -> BackendSpec {
        BackendSpec::new(model, model, Shaping::Default)
    }

    fn client(fake: FakeBackend, timeout_ms: u64) -> CompletionClient {
        CompletionClient::new(Arc::new(fake), Duration::from_millis(timeout_ms), 500)
    }

    #[test]
    fn strips_quotes_and_whitespace() {
        assert_eq!(clean_text("  \"hot\"  "), "hot");
        assert_eq!(clean_text("'black'\n"), "black");
        assert_eq!(clean_text("\" 'ground up' \""), "ground up");
        assert_eq!(clean_text("don't stop"), "don't stop");
    }

    #[test]
    fn error_marker_is_bounded() {
        let long = "x".repeat(500);
        let marker = error_marker(&long);
        assert_eq!(marker.len(), "[Error: ]".len() + MAX_ERROR_CHARS);
        assert!(marker.starts_with("[Error: "));
    }

    #[test]
    fn prompt_embeds_word() {
        assert_eq!(user_prompt("coffee"), "I like my women like I like my coffee...");
    }

    #[tokio::test]
    async fn success_captures_text_and_usage() {
        let c = client(FakeBackend::new().with("a", FakeBehavior::reply("\"hot\"")), 1000);
        let out = c.complete(&spec("a"), "coffee").await;
        assert!(!out.failed);
        assert_eq!(out.text, "hot");
        assert_eq!(out.prompt_tokens, 200);
        assert_eq!(out.completion_tokens, 4);
        assert!(out.latency_secs >= 0.0);
    }

    #[tokio::test]
    async fn backend_error_becomes_marker_with_zero_numbers() {
        let c = client(FakeBackend::new().with("a", FakeBehavior::fail("502 bad gateway")), 1000);
        let out = c.complete(&spec("a"), "coffee").await;
        assert!(out.failed);
        assert_eq!(out.text, "[Error: 502 bad gateway]");
        assert_eq!(out.latency_secs, 0.0);
        assert_eq!(out.completion_tokens, 0);
        assert_eq!(out.cost, 0.0);
    }

    #[tokio::test]
    async fn empty_content_is_a_failure() {
        let c = client(FakeBackend::new().with("a", FakeBehavior::Empty), 1000);
        let out = c.complete(&spec("a"), "coffee").await;
        assert!(out.failed);
        assert!(out.text.contains("no content"));
    }

    #[tokio::test(start_paused = true)]
    async fn hang_is_cut_off_by_timeout() {
        let c = client(FakeBackend::new().with("a", FakeBehavior::Hang), 2000);
        let out = c.complete(&spec("a"), "coffee").await;
        assert!(out.failed);
        assert!(out.text.contains("timed out"), "{}", out.text);
    }
}
