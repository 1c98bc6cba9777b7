use punchline_core::completion::CompletionClient;
use punchline_core::model::Completion;
use punchline_core::providers::llm::fake::{FakeBackend, FakeBehavior};
use punchline_core::roster::{BackendSpec, Shaping};
use punchline_core::usage::log_usage_event;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn capture() -> (impl tracing::Subscriber + Send + Sync, Arc<Mutex<Vec<u8>>>) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let buffer_clone = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_writer(move || MockWriter(buffer_clone.clone()))
        .finish();
    (subscriber, buffer)
}

fn output(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
}

#[test]
fn test_usage_event_is_structured() {
    let (subscriber, buffer) = capture();

    tracing::subscriber::with_default(subscriber, || {
        log_usage_event(
            "GPT-5",
            "openai/gpt-5",
            &Completion {
                text: "hot".into(),
                prompt_tokens: 210,
                completion_tokens: 3,
                reasoning_tokens: 64,
                cost: 0.0012,
                ..Default::default()
            },
        );
    });

    let out = output(&buffer);
    assert!(out.contains("\"event\":\"punchline.usage.metered\""));
    assert!(out.contains("\"target\":\"punchline_usage\""));
    assert!(out.contains("\"backend\":\"GPT-5\""));
    assert!(out.contains("\"reasoning_tokens\":64"));
    assert!(out.contains("\"timestamp\""));
}

#[tokio::test]
async fn test_failed_completion_logs_warning_without_usage() {
    let (subscriber, buffer) = capture();
    let _guard = tracing::subscriber::set_default(subscriber);

    let fake = FakeBackend::new().with("vendor/a", FakeBehavior::fail("401 unauthorized"));
    let client = CompletionClient::new(Arc::new(fake), Duration::from_secs(5), 500);
    let out = client
        .complete(&BackendSpec::new("A", "vendor/a", Shaping::Default), "coffee")
        .await;
    assert!(out.failed);

    let logs = output(&buffer);
    assert!(logs.contains("\"event\":\"completion.failed\""));
    assert!(logs.contains("\"level\":\"WARN\""));
    assert!(logs.contains("401 unauthorized"));
    assert!(!logs.contains("punchline.usage.metered"));
}

struct MockWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
