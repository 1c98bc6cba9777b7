use crate::config::ServerConfig;
use anyhow::Result;
use moka::sync::Cache;
use punchline_core::ledger::SESSION_TTL_DAYS;
use punchline_core::{CompetitionError, Ledger, Orchestrator, Voter, VoterSession};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

static RID: AtomicU64 = AtomicU64::new(1);

fn next_rid() -> String {
    let n = RID.fetch_add(1, Ordering::Relaxed);
    format!("r-{n:06}")
}

pub mod codes {
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL: i32 = -32603;
    pub const NOT_FOUND: i32 = -32004;
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Option<Value>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
}

/// A failed call, already mapped to its JSON-RPC code.
#[derive(Debug)]
struct CallError {
    code: i32,
    message: String,
}

impl CallError {
    fn params(e: impl std::fmt::Display) -> Self {
        Self {
            code: codes::INVALID_PARAMS,
            message: format!("invalid params: {}", e),
        }
    }
}

impl From<CompetitionError> for CallError {
    fn from(e: CompetitionError) -> Self {
        let code = match &e {
            CompetitionError::InvalidInput(_) => codes::INVALID_PARAMS,
            CompetitionError::NotFound { .. } => codes::NOT_FOUND,
            CompetitionError::Storage(_) => codes::INTERNAL,
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for CallError {
    fn from(e: serde_json::Error) -> Self {
        Self {
            code: codes::INTERNAL,
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompeteParams {
    word: String,
    #[serde(default)]
    voter_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    game_id: String,
}

#[derive(Debug, Deserialize)]
struct VoteParams {
    game_id: String,
    result_ids: Vec<i64>,
    #[serde(default)]
    voter_ip: Option<String>,
    #[serde(default)]
    voter_session: Option<String>,
}

fn parse<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, CallError> {
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(CallError::params)
}

const MAX_TOKEN_CHARS: usize = 64;

pub struct Server {
    orchestrator: Orchestrator,
    ledger: Ledger,
    sessions: Cache<String, VoterSession>,
    cfg: ServerConfig,
}

impl Server {
    pub fn new(orchestrator: Orchestrator, cfg: ServerConfig) -> Self {
        let sessions = Cache::builder()
            .max_capacity(cfg.session_cache_entries)
            .time_to_live(Duration::from_secs(SESSION_TTL_DAYS as u64 * 24 * 3600))
            .build();
        Self {
            ledger: Ledger::new(orchestrator.store().clone()),
            orchestrator,
            sessions,
            cfg,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Serves one request per line until the reader hits EOF.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(resp) = self.handle_line(&line).await {
                writer.write_all(resp.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        self.orchestrator.shutdown();
        Ok(())
    }

    /// Returns the serialized response, or `None` for lines that get no reply.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let rid = next_rid();

        if line.len() > self.cfg.max_msg_bytes {
            tracing::warn!(
                target: "punchline_server",
                event = "limit_exceeded",
                rid = %rid,
                bytes_in = line.len(),
                max = self.cfg.max_msg_bytes
            );
            let resp = JsonRpcResponse::error(
                None,
                codes::INVALID_REQUEST,
                format!(
                    "message bytes={} > max={}",
                    line.len(),
                    self.cfg.max_msg_bytes
                ),
            );
            return serde_json::to_string(&resp).ok();
        }

        if line.trim().is_empty() {
            return None;
        }

        let req: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(event = "json_parse_error", rid = %rid, error = %e);
                return None;
            }
        };

        let started = Instant::now();
        tracing::info!(event = "rpc.request", rid = %rid, method = %req.method);

        let outcome = match timeout(self.cfg.request_timeout(), self.call(&req.method, req.params))
            .await
        {
            Ok(r) => r,
            Err(_) => Err(CallError {
                code: codes::INTERNAL,
                message: format!("request timed out after {}ms", self.cfg.request_timeout_ms),
            }),
        };

        let resp = match outcome {
            Ok(result) => {
                tracing::info!(
                    event = "rpc.done",
                    rid = %rid,
                    method = %req.method,
                    duration_ms = started.elapsed().as_millis() as u64,
                );
                JsonRpcResponse::ok(req.id, result)
            }
            Err(e) => {
                tracing::warn!(
                    event = "rpc.failed",
                    rid = %rid,
                    method = %req.method,
                    code = e.code,
                    error = %e.message,
                );
                JsonRpcResponse::error(req.id, e.code, e.message)
            }
        };
        serde_json::to_string(&resp).ok()
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CallError> {
        match method {
            "compete" => {
                let p: CompeteParams = parse(params)?;
                let ticket = self.orchestrator.compete(&p.word)?;
                tracing::debug!(
                    event = "rpc.compete",
                    game_id = %ticket.game_id,
                    voter_ip = p.voter_ip.as_deref().unwrap_or("-"),
                );
                Ok(serde_json::to_value(ticket)?)
            }
            "compete/status" => {
                let p: StatusParams = parse(params)?;
                Ok(serde_json::to_value(self.orchestrator.status(&p.game_id)?)?)
            }
            "vote" => {
                let p: VoteParams = parse(params)?;
                let session = self.session_for(p.voter_session.as_deref());
                let voter = Voter::new(p.voter_ip.as_deref().unwrap_or("unknown"), &session);
                let receipt = self.ledger.vote(&p.game_id, &p.result_ids, &voter)?;
                Ok(serde_json::json!({
                    "receipt": receipt,
                    "voter_session": session.token,
                }))
            }
            "leaderboard" => Ok(serde_json::to_value(self.ledger.leaderboard()?)?),
            "costs" => Ok(serde_json::to_value(self.ledger.cost_summary()?)?),
            "roster" => Ok(serde_json::to_value(self.orchestrator.roster())?),
            _ => Err(CallError {
                code: codes::METHOD_NOT_FOUND,
                message: format!("Method not found: {}", method),
            }),
        }
    }

    /// Known, unexpired tokens are kept; unknown client tokens are adopted;
    /// anything else gets a fresh session.
    fn session_for(&self, token: Option<&str>) -> VoterSession {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty() && t.chars().count() <= MAX_TOKEN_CHARS);
        let session = match token {
            Some(t) => match self.sessions.get(t) {
                Some(known) => VoterSession::renew(Some(known)),
                None => VoterSession::adopt(t),
            },
            None => VoterSession::issue(),
        };
        self.sessions.insert(session.token.clone(), session.clone());
        session
    }
}
