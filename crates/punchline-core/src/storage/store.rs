use crate::errors::StoreError;
use crate::model::{
    BackendCost, BackendResult, Completion, Contestant, CostSummary, Game, LeaderboardRow,
    ResultState, Suggestion,
};
use crate::roster::Roster;
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

const RESULT_COLUMNS: &str = "r.id, r.suggestion_id, r.backend_name, r.backend_id, r.status, r.text,
     r.failed, r.latency_secs, r.completion_tokens, r.reasoning_tokens, r.prompt_tokens, r.cost";

const GAME_COLUMNS: &str =
    "id, suggestion_id, winning_result_id, voter_ip, voter_session, created_at, voted_at";

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock();
        conn.execute_batch(crate::storage::schema::DDL)
            .context("failed to apply schema")?;
        Ok(())
    }

    // Every critical section either commits or rolls back its transaction,
    // so a poisoned guard still holds a consistent connection.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- suggestions ---

    pub fn find_suggestion(&self, word: &str) -> Result<Option<Suggestion>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, word, created_at FROM suggestions WHERE word = ?1",
                params![word],
                map_suggestion,
            )
            .optional()?;
        Ok(row)
    }

    /// Inserts the suggestion and one pending result per roster entry in a
    /// single transaction. A duplicate word yields `StoreError::Conflict`.
    pub fn create_suggestion(
        &self,
        word: &str,
        roster: &Roster,
    ) -> Result<(Suggestion, Vec<BackendResult>), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let created_at = now_rfc3339();

        tx.execute(
            "INSERT INTO suggestions(word, created_at) VALUES (?1, ?2)",
            params![word, created_at],
        )?;
        let suggestion_id = tx.last_insert_rowid();

        let mut slots = Vec::with_capacity(roster.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO backend_results(suggestion_id, backend_name, backend_id, status)
                 VALUES (?1, ?2, ?3, 'pending')",
            )?;
            for spec in &roster.backends {
                stmt.execute(params![suggestion_id, spec.name, spec.model])?;
                slots.push(BackendResult {
                    id: tx.last_insert_rowid(),
                    suggestion_id,
                    backend_name: spec.name.clone(),
                    backend_id: spec.model.clone(),
                    state: ResultState::Pending,
                });
            }
        }
        tx.commit()?;

        Ok((
            Suggestion {
                id: suggestion_id,
                word: word.to_string(),
                created_at,
            },
            slots,
        ))
    }

    // --- backend results ---

    pub fn results_for_suggestion(
        &self,
        suggestion_id: i64,
    ) -> Result<Vec<BackendResult>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESULT_COLUMNS} FROM backend_results r
             WHERE r.suggestion_id = ?1
             ORDER BY r.id ASC"
        ))?;
        let rows = stmt
            .query_map(params![suggestion_id], map_result)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_result(&self, id: i64) -> Result<Option<BackendResult>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {RESULT_COLUMNS} FROM backend_results r WHERE r.id = ?1"),
                params![id],
                map_result,
            )
            .optional()?;
        Ok(row)
    }

    /// Moves a pending result to completed. Returns false when the row was
    /// already completed (or does not exist); completed rows are never rewritten.
    pub fn complete_result(&self, id: i64, c: &Completion) -> Result<bool, StoreError> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE backend_results
             SET status = 'completed', text = ?2, failed = ?3, latency_secs = ?4,
                 completion_tokens = ?5, reasoning_tokens = ?6, prompt_tokens = ?7,
                 cost = ?8, completed_at = ?9
             WHERE id = ?1 AND status = 'pending'",
            params![
                id,
                c.text,
                c.failed,
                c.latency_secs,
                c.completion_tokens,
                c.reasoning_tokens,
                c.prompt_tokens,
                c.cost,
                now_rfc3339()
            ],
        )?;
        Ok(changed == 1)
    }

    // --- games ---

    /// Creates a game and its contestant rows; positions follow slice order.
    pub fn create_game(
        &self,
        suggestion_id: i64,
        contestant_ids: &[i64],
    ) -> Result<Game, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let created_at = now_rfc3339();

        tx.execute(
            "INSERT INTO games(id, suggestion_id, created_at) VALUES (?1, ?2, ?3)",
            params![id, suggestion_id, created_at],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO game_contestants(game_id, result_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (pos, result_id) in contestant_ids.iter().enumerate() {
                stmt.execute(params![id, result_id, pos as i64])?;
            }
        }
        tx.commit()?;

        Ok(Game {
            id,
            suggestion_id,
            winning_result_id: None,
            voter_ip: None,
            voter_session: None,
            created_at,
            voted_at: None,
        })
    }

    pub fn get_game(&self, id: &str) -> Result<Option<Game>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {GAME_COLUMNS} FROM games WHERE id = ?1"),
                params![id],
                map_game,
            )
            .optional()?;
        Ok(row)
    }

    pub fn game_contestants(&self, game_id: &str) -> Result<Vec<Contestant>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT gc.position, {RESULT_COLUMNS}
             FROM game_contestants gc
             JOIN backend_results r ON r.id = gc.result_id
             WHERE gc.game_id = ?1
             ORDER BY gc.position ASC"
        ))?;
        let rows = stmt
            .query_map(params![game_id], |row| {
                let position: i64 = row.get(0)?;
                Ok(Contestant {
                    position: position as u32,
                    result: map_result_at(row, 1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Records the winner and voter, returning the previous winner if the game
    /// had already been voted on.
    pub fn set_winner(
        &self,
        game_id: &str,
        result_id: i64,
        voter_ip: &str,
        voter_session: &str,
    ) -> Result<Option<i64>, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let previous: Option<i64> = tx.query_row(
            "SELECT winning_result_id FROM games WHERE id = ?1",
            params![game_id],
            |r| r.get(0),
        )?;
        tx.execute(
            "UPDATE games
             SET winning_result_id = ?2, voter_ip = ?3, voter_session = ?4, voted_at = ?5
             WHERE id = ?1",
            params![game_id, result_id, voter_ip, voter_session, now_rfc3339()],
        )?;
        tx.commit()?;
        Ok(previous)
    }

    // --- derived reads ---

    pub fn leaderboard(&self) -> Result<Vec<LeaderboardRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT
                b.backend_name,
                MAX(b.backend_id),
                SUM(CASE WHEN b.status = 'completed' THEN 1 ELSE 0 END),
                SUM(CASE WHEN b.status = 'completed' AND b.failed = 1 THEN 1 ELSE 0 END),
                (SELECT COUNT(DISTINCT gc.game_id)
                   FROM game_contestants gc
                   JOIN games g ON g.id = gc.game_id
                   JOIN backend_results cr ON cr.id = gc.result_id
                   JOIN backend_results wr ON wr.id = g.winning_result_id
                  WHERE cr.backend_name = b.backend_name
                    AND cr.text = wr.text),
                (SELECT COUNT(*)
                   FROM game_contestants gc
                   JOIN games g ON g.id = gc.game_id
                   JOIN backend_results cr ON cr.id = gc.result_id
                  WHERE cr.backend_name = b.backend_name
                    AND g.winning_result_id IS NOT NULL),
                AVG(CASE WHEN b.status = 'completed' AND b.failed = 0 THEN b.latency_secs END),
                AVG(CASE WHEN b.status = 'completed' AND b.failed = 0 THEN b.completion_tokens END),
                AVG(CASE WHEN b.status = 'completed' AND b.failed = 0 THEN b.reasoning_tokens END)
             FROM backend_results b
             GROUP BY b.backend_name",
        )?;

        let mut rows = stmt
            .query_map([], |row| {
                let win_count = row.get::<_, i64>(4)? as u64;
                let appearance_count = row.get::<_, i64>(5)? as u64;
                Ok(LeaderboardRow {
                    backend_name: row.get(0)?,
                    backend_id: row.get(1)?,
                    completed_count: row.get::<_, i64>(2)? as u64,
                    failure_count: row.get::<_, i64>(3)? as u64,
                    win_count,
                    appearance_count,
                    win_rate: if appearance_count == 0 {
                        0.0
                    } else {
                        win_count as f64 / appearance_count as f64
                    },
                    avg_latency_secs: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                    avg_completion_tokens: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
                    avg_reasoning_tokens: row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.sort_by(|a, b| {
            b.win_count
                .cmp(&a.win_count)
                .then(b.win_rate.total_cmp(&a.win_rate))
                .then_with(|| a.backend_name.cmp(&b.backend_name))
        });
        Ok(rows)
    }

    pub fn cost_summary(&self) -> Result<CostSummary, StoreError> {
        let conn = self.lock();

        let suggestion_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM suggestions", [], |r| r.get(0))?;
        let total_tokens: i64 = conn.query_row(
            "SELECT COALESCE(SUM(prompt_tokens + completion_tokens), 0)
             FROM backend_results WHERE status = 'completed'",
            [],
            |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT backend_name, COUNT(*), COALESCE(SUM(cost), 0.0),
                    COALESCE(SUM(completion_tokens), 0)
             FROM backend_results
             WHERE status = 'completed'
             GROUP BY backend_name",
        )?;
        let mut backends = stmt
            .query_map([], |row| {
                let calls = row.get::<_, i64>(1)? as u64;
                let total_cost: f64 = row.get(2)?;
                Ok(BackendCost {
                    backend_name: row.get(0)?,
                    calls,
                    total_cost,
                    avg_cost: if calls == 0 { 0.0 } else { total_cost / calls as f64 },
                    total_completion_tokens: row.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        backends.sort_by(|a, b| {
            b.total_cost
                .total_cmp(&a.total_cost)
                .then_with(|| a.backend_name.cmp(&b.backend_name))
        });

        let total_cost: f64 = backends.iter().map(|b| b.total_cost).sum();
        Ok(CostSummary {
            total_cost,
            total_tokens: total_tokens as u64,
            suggestion_count: suggestion_count as u64,
            avg_cost_per_suggestion: if suggestion_count == 0 {
                0.0
            } else {
                total_cost / suggestion_count as f64
            },
            backends,
        })
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn map_suggestion(row: &Row<'_>) -> rusqlite::Result<Suggestion> {
    Ok(Suggestion {
        id: row.get(0)?,
        word: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn map_game(row: &Row<'_>) -> rusqlite::Result<Game> {
    Ok(Game {
        id: row.get(0)?,
        suggestion_id: row.get(1)?,
        winning_result_id: row.get(2)?,
        voter_ip: row.get(3)?,
        voter_session: row.get(4)?,
        created_at: row.get(5)?,
        voted_at: row.get(6)?,
    })
}

fn map_result(row: &Row<'_>) -> rusqlite::Result<BackendResult> {
    map_result_at(row, 0)
}

fn map_result_at(row: &Row<'_>, at: usize) -> rusqlite::Result<BackendResult> {
    let status: String = row.get(at + 4)?;
    let state = match status.as_str() {
        "completed" => ResultState::Completed(Completion {
            text: row.get::<_, Option<String>>(at + 5)?.unwrap_or_default(),
            failed: row.get(at + 6)?,
            latency_secs: row.get(at + 7)?,
            completion_tokens: row.get(at + 8)?,
            reasoning_tokens: row.get(at + 9)?,
            prompt_tokens: row.get(at + 10)?,
            cost: row.get(at + 11)?,
        }),
        _ => ResultState::Pending,
    };
    Ok(BackendResult {
        id: row.get(at)?,
        suggestion_id: row.get(at + 1)?,
        backend_name: row.get(at + 2)?,
        backend_id: row.get(at + 3)?,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{BackendSpec, Shaping};

    fn roster(names: &[&str]) -> Roster {
        Roster::new(
            names
                .iter()
                .map(|n| BackendSpec::new(n, &format!("vendor/{}", n.to_lowercase()), Shaping::Default))
                .collect(),
        )
        .unwrap()
    }

    fn store() -> Store {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        s
    }

    fn count(s: &Store, table: &str) -> i64 {
        s.lock()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    fn done(text: &str) -> Completion {
        Completion {
            text: text.into(),
            latency_secs: 1.0,
            completion_tokens: 3,
            ..Default::default()
        }
    }

    #[test]
    fn create_suggestion_writes_one_pending_row_per_backend() {
        let s = store();
        let (sugg, slots) = s.create_suggestion("coffee", &roster(&["A", "B", "C"])).unwrap();
        assert_eq!(sugg.word, "coffee");
        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|r| r.state == ResultState::Pending));
        assert_eq!(s.results_for_suggestion(sugg.id).unwrap(), slots);
    }

    #[test]
    fn duplicate_word_is_a_conflict_and_writes_nothing() {
        let s = store();
        s.create_suggestion("coffee", &roster(&["A"])).unwrap();
        let err = s.create_suggestion("coffee", &roster(&["A"])).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(count(&s, "suggestions"), 1);
        assert_eq!(count(&s, "backend_results"), 1);
    }

    #[test]
    fn completion_happens_once() {
        let s = store();
        let (_, slots) = s.create_suggestion("coffee", &roster(&["A"])).unwrap();
        assert!(s.complete_result(slots[0].id, &done("hot")).unwrap());
        assert!(!s.complete_result(slots[0].id, &done("cold")).unwrap());
        let row = s.get_result(slots[0].id).unwrap().unwrap();
        assert_eq!(row.text(), Some("hot"));
    }

    #[test]
    fn game_contestants_keep_positions() {
        let s = store();
        let (sugg, slots) = s.create_suggestion("tea", &roster(&["A", "B", "C"])).unwrap();
        let ids = vec![slots[2].id, slots[0].id];
        let game = s.create_game(sugg.id, &ids).unwrap();
        let cs = s.game_contestants(&game.id).unwrap();
        assert_eq!(cs.len(), 2);
        assert_eq!(cs[0].position, 0);
        assert_eq!(cs[0].result.backend_name, "C");
        assert_eq!(cs[1].result.backend_name, "A");
        assert!(s.get_game("nope").unwrap().is_none());
    }

    #[test]
    fn set_winner_reports_previous_vote() {
        let s = store();
        let (sugg, slots) = s.create_suggestion("tea", &roster(&["A", "B"])).unwrap();
        let game = s.create_game(sugg.id, &[slots[0].id, slots[1].id]).unwrap();
        assert_eq!(s.set_winner(&game.id, slots[0].id, "1.2.3.4", "tok").unwrap(), None);
        assert_eq!(
            s.set_winner(&game.id, slots[1].id, "1.2.3.4", "tok").unwrap(),
            Some(slots[0].id)
        );
        let g = s.get_game(&game.id).unwrap().unwrap();
        assert_eq!(g.winning_result_id, Some(slots[1].id));
        assert!(g.voted_at.is_some());
    }
}
