use crate::roster::Roster;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Process-wide settings, loaded once at start.
#[derive(Clone, Debug)]
pub struct PunchlineConfig {
    pub db_path: PathBuf,
    pub api_key: Option<String>,
    pub base_url: String,
    pub roster_path: Option<PathBuf>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub contestants: usize,
    pub competition_grace_secs: u64,
    pub max_in_flight: usize,
    pub log_level: String,
}

impl Default for PunchlineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".punchline/punchline.db"),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            roster_path: None,
            timeout_secs: 30,
            max_tokens: 500,
            contestants: 4,
            competition_grace_secs: 600,
            max_in_flight: 64,
            log_level: "info".to_string(),
        }
    }
}

impl PunchlineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("PUNCHLINE_DB") {
            cfg.db_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("OPENROUTER_API_KEY") {
            if !v.trim().is_empty() {
                cfg.api_key = Some(v);
            }
        }
        if let Ok(v) = env::var("PUNCHLINE_BASE_URL") {
            cfg.base_url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("PUNCHLINE_ROSTER") {
            cfg.roster_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = env::var("PUNCHLINE_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                cfg.timeout_secs = n;
            }
        }
        if let Ok(v) = env::var("PUNCHLINE_MAX_TOKENS") {
            if let Ok(n) = v.parse() {
                cfg.max_tokens = n;
            }
        }
        if let Ok(v) = env::var("PUNCHLINE_CONTESTANTS") {
            if let Ok(n) = v.parse::<usize>() {
                if n > 0 {
                    cfg.contestants = n;
                }
            }
        }
        if let Ok(v) = env::var("PUNCHLINE_GRACE_SECS") {
            if let Ok(n) = v.parse() {
                cfg.competition_grace_secs = n;
            }
        }
        if let Ok(v) = env::var("PUNCHLINE_MAX_IN_FLIGHT") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.max_in_flight = n.max(1);
            }
        }
        if let Ok(v) = env::var("PUNCHLINE_LOG") {
            cfg.log_level = v;
        }
        cfg
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.competition_grace_secs)
    }

    /// Roster file if configured, otherwise the built-in one.
    pub fn load_roster(&self) -> anyhow::Result<Roster> {
        match &self.roster_path {
            Some(p) => Roster::load(p),
            None => Ok(Roster::default()),
        }
    }
}
