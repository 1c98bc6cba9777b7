use super::{ChatReply, ChatRequest, CompletionBackend, Usage};
use async_trait::async_trait;
use serde_json::json;

/// OpenAI-compatible chat endpoint (OpenRouter by default).
pub struct OpenRouterClient {
    pub base_url: String,
    pub api_key: String,
    pub client: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn request_body(req: &ChatRequest) -> serde_json::Value {
        let mut body = json!({
            "model": req.model,
            "messages": [
                { "role": "system", "content": req.system },
                { "role": "user", "content": req.user }
            ],
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
            "usage": { "include": true },
        });
        if let Some(obj) = body.as_object_mut() {
            obj.extend(req.shaping.request_overrides());
        }
        body
    }
}

/// Pulls usage numbers out of a chat completion payload. Missing fields are zero.
pub fn parse_usage(json: &serde_json::Value) -> Usage {
    let count = |ptr: &str| {
        json.pointer(ptr)
            .and_then(|v| v.as_u64())
            .map(|v| v.min(u32::MAX as u64) as u32)
    };
    Usage {
        prompt_tokens: count("/usage/prompt_tokens").unwrap_or(0),
        completion_tokens: count("/usage/completion_tokens").unwrap_or(0),
        reasoning_tokens: count("/usage/completion_tokens_details/reasoning_tokens")
            .or_else(|| count("/usage/reasoning_tokens"))
            .unwrap_or(0),
        cost: json
            .pointer("/usage/cost")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterClient {
    async fn chat(&self, req: &ChatRequest) -> anyhow::Result<ChatReply> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(req);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat API error {}: {}", status.as_u16(), error_text);
        }

        let json: serde_json::Value = resp.json().await?;

        if let Some(err) = json.get("error") {
            let msg = err
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            anyhow::bail!("chat API error: {}", msg);
        }

        if json.pointer("/choices/0").is_none() {
            anyhow::bail!("chat API response has no choices");
        }

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(ChatReply {
            text,
            usage: parse_usage(&json),
        })
    }

    fn provider_name(&self) -> &'static str {
        "openrouter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{EffortLevel, Shaping};

    fn req(shaping: Shaping) -> ChatRequest {
        ChatRequest {
            model: "openai/gpt-5".into(),
            system: "sys".into(),
            user: "I like my women like I like my coffee...".into(),
            temperature: 0.0,
            max_tokens: 500,
            shaping,
        }
    }

    #[test]
    fn body_carries_fixed_policy_and_shaping() {
        let body = OpenRouterClient::request_body(&req(Shaping::ReasoningEffort(EffortLevel::Low)));
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["usage"]["include"], true);
        assert_eq!(body["reasoning_effort"], "low");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "I like my women like I like my coffee...");

        let plain = OpenRouterClient::request_body(&req(Shaping::Default));
        assert!(plain.get("reasoning_effort").is_none());
        assert!(plain.get("reasoning").is_none());
    }

    #[test]
    fn usage_reads_nested_reasoning_and_cost() {
        let json = serde_json::json!({
            "usage": {
                "prompt_tokens": 210,
                "completion_tokens": 12,
                "completion_tokens_details": { "reasoning_tokens": 64 },
                "cost": 0.00042
            }
        });
        let u = parse_usage(&json);
        assert_eq!(u.prompt_tokens, 210);
        assert_eq!(u.completion_tokens, 12);
        assert_eq!(u.reasoning_tokens, 64);
        assert!((u.cost - 0.00042).abs() < 1e-12);
    }

    #[test]
    fn usage_defaults_to_zero() {
        assert_eq!(parse_usage(&serde_json::json!({})), Usage::default());
        let flat = parse_usage(&serde_json::json!({ "usage": { "reasoning_tokens": 5 } }));
        assert_eq!(flat.reasoning_tokens, 5);
    }
}
