use serde::{Deserialize, Serialize};

/// Durable record for one distinct (normalized) word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: i64,
    pub word: String,
    pub created_at: String,
}

/// Numbers and text recorded once a backend call returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    /// True when `text` is an error marker rather than a real completion.
    #[serde(default)]
    pub failed: bool,
    pub latency_secs: f64,
    pub completion_tokens: u32,
    pub reasoning_tokens: u32,
    pub prompt_tokens: u32,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultState {
    Pending,
    Completed(Completion),
}

impl ResultState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultState::Pending => "pending",
            ResultState::Completed(_) => "completed",
        }
    }
}

/// One backend's outcome for one suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResult {
    pub id: i64,
    pub suggestion_id: i64,
    pub backend_name: String,
    pub backend_id: String,
    pub state: ResultState,
}

impl BackendResult {
    pub fn completion(&self) -> Option<&Completion> {
        match &self.state {
            ResultState::Completed(c) => Some(c),
            ResultState::Pending => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, ResultState::Completed(_))
    }

    pub fn text(&self) -> Option<&str> {
        self.completion().map(|c| c.text.as_str())
    }
}

/// One shown matchup. `id` is an opaque token handed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub suggestion_id: i64,
    pub winning_result_id: Option<i64>,
    pub voter_ip: Option<String>,
    pub voter_session: Option<String>,
    pub created_at: String,
    pub voted_at: Option<String>,
}

/// A contestant slot of a game joined with its result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contestant {
    pub position: u32,
    pub result: BackendResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub backend_name: String,
    pub backend_id: String,
    pub completed_count: u64,
    pub failure_count: u64,
    pub win_count: u64,
    pub appearance_count: u64,
    pub win_rate: f64,
    pub avg_latency_secs: f64,
    pub avg_completion_tokens: f64,
    pub avg_reasoning_tokens: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendCost {
    pub backend_name: String,
    pub calls: u64,
    pub total_cost: f64,
    pub avg_cost: f64,
    pub total_completion_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_cost: f64,
    pub total_tokens: u64,
    pub suggestion_count: u64,
    pub avg_cost_per_suggestion: f64,
    pub backends: Vec<BackendCost>,
}
