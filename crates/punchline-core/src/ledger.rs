use crate::errors::CompetitionError;
use crate::model::{CostSummary, LeaderboardRow};
use crate::storage::Store;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sessions are reissued after this many days.
pub const SESSION_TTL_DAYS: i64 = 30;

/// Stable per-client voter token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterSession {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl VoterSession {
    pub fn issue() -> Self {
        Self {
            token: uuid::Uuid::new_v4().to_string(),
            issued_at: Utc::now(),
        }
    }

    /// Starts tracking a token the client already holds.
    pub fn adopt(token: &str) -> Self {
        Self {
            token: token.to_string(),
            issued_at: Utc::now(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at >= Duration::days(SESSION_TTL_DAYS)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Keeps `existing` while it is valid, otherwise issues a new session.
    pub fn renew(existing: Option<VoterSession>) -> Self {
        existing
            .filter(|s| !s.is_expired() && !s.token.trim().is_empty())
            .unwrap_or_else(Self::issue)
    }

    /// Reads the session stored at `path`, reissuing (and rewriting the file)
    /// when it is missing, unreadable or expired.
    pub fn load_or_issue(path: &Path) -> anyhow::Result<Self> {
        let existing = std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<VoterSession>(&raw).ok());
        let session = Self::renew(existing.clone());
        if existing.as_ref() != Some(&session) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&session)?)
                .with_context(|| format!("failed to write session {}", path.display()))?;
        }
        Ok(session)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voter {
    pub ip: String,
    pub session_token: String,
}

impl Voter {
    pub fn new(ip: &str, session: &VoterSession) -> Self {
        Self {
            ip: ip.to_string(),
            session_token: session.token.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub game_id: String,
    pub winning_result_id: i64,
    pub winning_text: String,
    /// Every contestant backend that produced the winning text.
    pub credited_backends: Vec<String>,
    /// Set when this vote replaced an earlier one.
    pub previous_winner: Option<i64>,
}

/// Records votes and answers the derived leaderboard and cost reads.
#[derive(Clone)]
pub struct Ledger {
    store: Store,
}

impl Ledger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Records the group identified by `result_ids` as the game's winner.
    ///
    /// The ids must be contestants of the game that share one text. The
    /// group member shown first is stored as the winning result, even when
    /// only some of the group's ids were sent. A repeated vote
    /// replaces the earlier one.
    pub fn vote(
        &self,
        game_id: &str,
        result_ids: &[i64],
        voter: &Voter,
    ) -> Result<VoteReceipt, CompetitionError> {
        let game = self
            .store
            .get_game(game_id)?
            .ok_or_else(|| CompetitionError::game_not_found(game_id))?;
        if result_ids.is_empty() {
            return Err(CompetitionError::InvalidInput(
                "vote names no result ids".into(),
            ));
        }

        let contestants = self.store.game_contestants(&game.id)?;
        let mut chosen = Vec::with_capacity(result_ids.len());
        for id in result_ids {
            let c = contestants
                .iter()
                .find(|c| c.result.id == *id)
                .ok_or_else(|| {
                    CompetitionError::InvalidInput(format!(
                        "result {} is not a contestant of game {}",
                        id, game.id
                    ))
                })?;
            if !c.result.is_completed() {
                return Err(CompetitionError::InvalidInput(format!(
                    "result {} has not completed yet",
                    id
                )));
            }
            chosen.push(c);
        }

        let winning_text = chosen[0].result.text().unwrap_or_default().to_string();
        if chosen
            .iter()
            .any(|c| c.result.text() != Some(winning_text.as_str()))
        {
            return Err(CompetitionError::InvalidInput(
                "chosen results do not share one text".into(),
            ));
        }
        // The whole group wins, whichever of its ids were sent.
        let group: Vec<_> = contestants
            .iter()
            .filter(|c| c.result.text() == Some(winning_text.as_str()))
            .collect();
        let winner = group
            .iter()
            .min_by_key(|c| c.position)
            .map(|c| c.result.id)
            .unwrap_or(result_ids[0]);

        let previous = self
            .store
            .set_winner(&game.id, winner, &voter.ip, &voter.session_token)?;

        let credited_backends: Vec<String> = group
            .iter()
            .map(|c| c.result.backend_name.clone())
            .collect();

        if let Some(prev) = previous {
            tracing::info!(
                event = "ledger.vote_overwritten",
                game_id = %game.id,
                previous_result_id = prev,
                result_id = winner,
            );
        }
        tracing::info!(
            event = "ledger.vote_recorded",
            game_id = %game.id,
            result_id = winner,
            credited = credited_backends.len(),
            voter_ip = %voter.ip,
        );

        Ok(VoteReceipt {
            game_id: game.id,
            winning_result_id: winner,
            winning_text,
            credited_backends,
            previous_winner: previous,
        })
    }

    pub fn leaderboard(&self) -> Result<Vec<LeaderboardRow>, CompetitionError> {
        Ok(self.store.leaderboard()?)
    }

    pub fn cost_summary(&self) -> Result<CostSummary, CompetitionError> {
        Ok(self.store.cost_summary()?)
    }
}
