//! Usage telemetry for backend calls.
//!
//! Every completed backend call emits one structured event so token and cost
//! consumption can be aggregated outside the process.

use crate::model::Completion;

pub fn log_usage_event(backend: &str, model: &str, completion: &Completion) {
    tracing::info!(
        target: "punchline_usage",
        event = "punchline.usage.metered",
        backend = %backend,
        model = %model,
        prompt_tokens = completion.prompt_tokens,
        completion_tokens = completion.completion_tokens,
        reasoning_tokens = completion.reasoning_tokens,
        cost = completion.cost,
    );
}
