use punchline_core::config::PunchlineConfig;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub request_timeout_ms: u64,
    pub max_msg_bytes: usize,
    pub session_cache_entries: u64,
    pub log_level: String,
    pub core: PunchlineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 2000,
            max_msg_bytes: 64_000,
            session_cache_entries: 100_000,
            log_level: "info".to_string(),
            core: PunchlineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let core = PunchlineConfig::from_env();
        let mut cfg = Self {
            log_level: core.log_level.clone(),
            core,
            ..Self::default()
        };
        if let Ok(v) = env::var("PUNCHLINE_REQUEST_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                cfg.request_timeout_ms = n;
            }
        }
        if let Ok(v) = env::var("PUNCHLINE_MAX_MSG_BYTES") {
            if let Ok(n) = v.parse() {
                cfg.max_msg_bytes = n;
            }
        }
        if let Ok(v) = env::var("PUNCHLINE_SESSION_ENTRIES") {
            if let Ok(n) = v.parse() {
                cfg.session_cache_entries = n;
            }
        }
        cfg
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bound_requests() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.request_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.max_msg_bytes, 64_000);
        assert_eq!(cfg.core.contestants, 4);
    }
}
