use crate::aggregate::{self, BallotEntry, DisplayGroup};
use crate::completion::{error_marker, CompletionClient};
use crate::config::PunchlineConfig;
use crate::engine::competition::Competition;
use crate::errors::CompetitionError;
use crate::model::{BackendResult, Completion, Contestant, Game, ResultState, Suggestion};
use crate::providers::llm::CompletionBackend;
use crate::registry::{Resolution, WordRegistry};
use crate::roster::Roster;
use crate::storage::Store;
use moka::sync::Cache;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Contestants shown per game.
    pub contestants: usize,
    /// How long an untouched competition entry stays in memory.
    pub grace: Duration,
    /// Upper bound on concurrent backend calls across all runs.
    pub max_in_flight: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            contestants: 4,
            grace: Duration::from_secs(600),
            max_in_flight: 64,
        }
    }
}

impl From<&PunchlineConfig> for OrchestratorOptions {
    fn from(cfg: &PunchlineConfig) -> Self {
        Self {
            contestants: cfg.contestants,
            grace: cfg.grace(),
            max_in_flight: cfg.max_in_flight,
        }
    }
}

/// Ballot plus the revealed groups, available once a game is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub ballot: Vec<BallotEntry>,
    pub groups: Vec<DisplayGroup>,
}

impl Payload {
    pub fn from_contestants(contestants: &[Contestant]) -> Self {
        let groups = aggregate::group(contestants);
        Self {
            ballot: aggregate::ballot(&groups),
            groups,
        }
    }
}

/// Response to a submitted word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub game_id: String,
    pub suggestion_id: i64,
    pub word: String,
    pub is_new: bool,
    pub ready: bool,
    pub total_contestants: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub game_id: String,
    pub completed_count: usize,
    pub total_contestants: usize,
    pub ready: bool,
    pub contestant_models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

/// Summary returned by a run's coordinator once every backend has returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub suggestion_id: i64,
    pub dispatched: usize,
    pub failed: usize,
    pub persisted: usize,
    pub elapsed_ms: u64,
}

struct Run {
    competition: Arc<Competition>,
    /// Taken by `settle`.
    handle: Option<JoinHandle<RunReport>>,
}

impl Run {
    fn is_live(&self) -> bool {
        !self.competition.is_settled() && self.handle.as_ref().map_or(true, |h| !h.is_finished())
    }
}

/// Everything a backend task needs, cloned into each run.
#[derive(Clone)]
struct Dispatcher {
    store: Store,
    client: CompletionClient,
    roster: Roster,
    permits: Arc<Semaphore>,
}

struct SlotOutcome {
    failed: bool,
    persisted: bool,
    became_ready: bool,
}

pub struct Orchestrator {
    registry: WordRegistry,
    dispatcher: Dispatcher,
    contestants: usize,
    competitions: Cache<i64, Arc<Competition>>,
    runs: Mutex<HashMap<i64, Run>>,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        roster: Roster,
        client: CompletionClient,
        opts: OrchestratorOptions,
    ) -> Self {
        let competitions = Cache::builder().time_to_idle(opts.grace).build();
        Self {
            registry: WordRegistry::new(store.clone(), roster.clone()),
            dispatcher: Dispatcher {
                store,
                client,
                roster,
                permits: Arc::new(Semaphore::new(opts.max_in_flight.max(1))),
            },
            contestants: opts.contestants.max(1),
            competitions,
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(
        cfg: &PunchlineConfig,
        store: Store,
        roster: Roster,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        let client = CompletionClient::new(backend, cfg.timeout(), cfg.max_tokens);
        Self::new(store, roster, client, OrchestratorOptions::from(cfg))
    }

    pub fn store(&self) -> &Store {
        &self.dispatcher.store
    }

    pub fn roster(&self) -> &Roster {
        &self.dispatcher.roster
    }

    fn lock_runs(&self) -> MutexGuard<'_, HashMap<i64, Run>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolves the word and creates a game for it. Never waits on a backend.
    ///
    /// Must be called from within a tokio runtime: new and resumed runs are
    /// spawned onto it.
    pub fn compete(&self, raw_word: &str) -> Result<Ticket, CompetitionError> {
        // Held across resolve and spawn so one process never dispatches a word twice.
        let mut runs = self.lock_runs();

        match self.registry.resolve(raw_word)? {
            Resolution::Created { suggestion, slots } => {
                self.start_run(&mut runs, suggestion, slots, true)
            }
            Resolution::Existing(suggestion) => {
                let live = self.live_competition(&runs, suggestion.id);
                if let Some(competition) = live.as_ref().filter(|c| !c.is_ready()) {
                    return self.join_run(&suggestion, competition);
                }

                let rows = self.store().results_for_suggestion(suggestion.id)?;
                if live.is_none() && rows.iter().any(|r| !r.is_completed()) {
                    return self.start_run(&mut runs, suggestion, rows, false);
                }
                self.serve_completed(&suggestion, &rows)
            }
        }
    }

    fn live_competition(
        &self,
        runs: &HashMap<i64, Run>,
        suggestion_id: i64,
    ) -> Option<Arc<Competition>> {
        if let Some(c) = self.competitions.get(&suggestion_id) {
            return Some(c);
        }
        // Evicted while its run is still going: put it back.
        let run = runs.get(&suggestion_id).filter(|r| r.is_live())?;
        self.competitions
            .insert(suggestion_id, run.competition.clone());
        Some(run.competition.clone())
    }

    fn start_run(
        &self,
        runs: &mut HashMap<i64, Run>,
        suggestion: Suggestion,
        rows: Vec<BackendResult>,
        is_new: bool,
    ) -> Result<Ticket, CompetitionError> {
        let k = self.contestants.min(rows.len());
        let sample: Vec<BackendResult> = rows
            .choose_multiple(&mut rand::thread_rng(), k)
            .cloned()
            .collect();
        let ids: Vec<i64> = sample.iter().map(|r| r.id).collect();
        let game = self.store().create_game(suggestion.id, &ids)?;

        let competition = Arc::new(Competition::new(
            suggestion.id,
            &sample,
            rows.iter().filter(|r| r.is_completed()).cloned(),
        ));
        let pending: Vec<BackendResult> = rows.into_iter().filter(|r| !r.is_completed()).collect();

        if is_new {
            tracing::info!(
                event = "competition.dispatch",
                suggestion_id = suggestion.id,
                word = %suggestion.word,
                game_id = %game.id,
                backends = pending.len(),
                contestants = k,
            );
        } else {
            tracing::info!(
                event = "competition.resumed",
                suggestion_id = suggestion.id,
                word = %suggestion.word,
                game_id = %game.id,
                pending = pending.len(),
                contestants = k,
            );
        }

        runs.retain(|_, r| r.is_live());
        self.competitions.insert(suggestion.id, competition.clone());
        let handle = tokio::spawn(self.dispatcher.clone().run(
            competition.clone(),
            suggestion.word.clone(),
            pending,
        ));
        runs.insert(
            suggestion.id,
            Run {
                competition: competition.clone(),
                handle: Some(handle),
            },
        );

        let progress = competition.progress();
        Ok(Ticket {
            game_id: game.id,
            suggestion_id: suggestion.id,
            word: suggestion.word,
            is_new,
            ready: progress.ready,
            total_contestants: k,
            payload: progress.snapshot.as_deref().map(Payload::from_contestants),
        })
    }

    fn join_run(
        &self,
        suggestion: &Suggestion,
        competition: &Competition,
    ) -> Result<Ticket, CompetitionError> {
        let ids = competition.contestant_ids();
        let game = self.store().create_game(suggestion.id, &ids)?;
        tracing::info!(
            event = "competition.joined",
            suggestion_id = suggestion.id,
            game_id = %game.id,
        );

        let progress = competition.progress();
        Ok(Ticket {
            game_id: game.id,
            suggestion_id: suggestion.id,
            word: suggestion.word.clone(),
            is_new: false,
            ready: progress.ready,
            total_contestants: ids.len(),
            payload: progress.snapshot.as_deref().map(Payload::from_contestants),
        })
    }

    /// Fresh random sample from rows that already completed; ready at once.
    fn serve_completed(
        &self,
        suggestion: &Suggestion,
        rows: &[BackendResult],
    ) -> Result<Ticket, CompetitionError> {
        let completed: Vec<&BackendResult> = rows.iter().filter(|r| r.is_completed()).collect();
        let k = self.contestants.min(completed.len());
        let sample: Vec<&BackendResult> = completed
            .choose_multiple(&mut rand::thread_rng(), k)
            .copied()
            .collect();
        let ids: Vec<i64> = sample.iter().map(|r| r.id).collect();
        let game = self.store().create_game(suggestion.id, &ids)?;

        let contestants: Vec<Contestant> = sample
            .into_iter()
            .enumerate()
            .map(|(pos, r)| Contestant {
                position: pos as u32,
                result: r.clone(),
            })
            .collect();

        Ok(Ticket {
            game_id: game.id,
            suggestion_id: suggestion.id,
            word: suggestion.word.clone(),
            is_new: false,
            ready: true,
            total_contestants: k,
            payload: Some(Payload::from_contestants(&contestants)),
        })
    }

    /// Progress of one game. Reads shared state only; never waits on a backend.
    pub fn status(&self, game_id: &str) -> Result<StatusReport, CompetitionError> {
        let (game, contestants) = load_game(self.store(), game_id)?;
        let ids: Vec<i64> = contestants.iter().map(|c| c.result.id).collect();

        let live = {
            let runs = self.lock_runs();
            self.live_competition(&runs, game.suggestion_id)
        };
        match live.filter(|c| c.contestant_ids() == ids) {
            Some(competition) => {
                let p = competition.progress();
                Ok(StatusReport {
                    game_id: game.id,
                    completed_count: p.completed_count,
                    total_contestants: p.total_contestants,
                    ready: p.ready,
                    contestant_models: contestant_models(&contestants),
                    payload: p.snapshot.as_deref().map(Payload::from_contestants),
                })
            }
            None => Ok(status_from_rows(game.id, &contestants)),
        }
    }

    pub fn is_running(&self, suggestion_id: i64) -> bool {
        self.lock_runs()
            .get(&suggestion_id)
            .is_some_and(|r| r.is_live())
    }

    /// Waits for a run to finish every backend call. `None` when there is no
    /// run to wait on (never started, already settled, or aborted).
    pub async fn settle(&self, suggestion_id: i64) -> Option<RunReport> {
        let handle = self
            .lock_runs()
            .get_mut(&suggestion_id)
            .and_then(|r| r.handle.take())?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(event = "competition.join_failed", suggestion_id, error = %e);
                None
            }
        }
    }

    /// Aborts every run. Rows still pending stay pending and are resumed by
    /// the next submission of their word.
    pub fn shutdown(&self) {
        let mut runs = self.lock_runs();
        let mut aborted = 0usize;
        for (_, run) in runs.drain() {
            if let Some(h) = run.handle {
                if !h.is_finished() {
                    aborted += 1;
                }
                h.abort();
            }
        }
        self.competitions.invalidate_all();
        tracing::info!(event = "competition.shutdown", aborted);
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        let runs = self.runs.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, run) in runs.drain() {
            if let Some(h) = run.handle {
                h.abort();
            }
        }
    }
}

fn load_game(store: &Store, game_id: &str) -> Result<(Game, Vec<Contestant>), CompetitionError> {
    let game = store
        .get_game(game_id)?
        .ok_or_else(|| CompetitionError::game_not_found(game_id))?;
    let contestants = store.game_contestants(&game.id)?;
    Ok((game, contestants))
}

fn contestant_models(contestants: &[Contestant]) -> Vec<String> {
    contestants
        .iter()
        .map(|c| c.result.backend_name.clone())
        .collect()
}

fn status_from_rows(game_id: String, contestants: &[Contestant]) -> StatusReport {
    let completed_count = contestants
        .iter()
        .filter(|c| c.result.is_completed())
        .count();
    let ready = completed_count == contestants.len();
    StatusReport {
        game_id,
        completed_count,
        total_contestants: contestants.len(),
        ready,
        contestant_models: contestant_models(contestants),
        payload: ready.then(|| Payload::from_contestants(contestants)),
    }
}

/// Status read from durable rows alone, for processes that do not own the
/// run (ready once every contestant row has completed).
pub fn durable_status(store: &Store, game_id: &str) -> Result<StatusReport, CompetitionError> {
    let (game, contestants) = load_game(store, game_id)?;
    Ok(status_from_rows(game.id, &contestants))
}

impl Dispatcher {
    async fn run(
        self,
        competition: Arc<Competition>,
        word: String,
        pending: Vec<BackendResult>,
    ) -> RunReport {
        let started = Instant::now();
        let suggestion_id = competition.suggestion_id();
        let mut report = RunReport {
            suggestion_id,
            dispatched: pending.len(),
            ..Default::default()
        };

        let mut set = JoinSet::new();
        for slot in pending {
            let this = self.clone();
            let competition = competition.clone();
            let word = word.clone();
            set.spawn(async move { this.complete_slot(&competition, slot, &word).await });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => {
                    if outcome.failed {
                        report.failed += 1;
                    }
                    if outcome.persisted {
                        report.persisted += 1;
                    }
                    if outcome.became_ready {
                        tracing::info!(
                            event = "competition.contestants_ready",
                            suggestion_id,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(event = "competition.task_failed", suggestion_id, error = %e);
                }
            }
        }

        competition.mark_settled();
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            event = "competition.settled",
            suggestion_id,
            dispatched = report.dispatched,
            failed = report.failed,
            elapsed_ms = report.elapsed_ms,
        );
        report
    }

    async fn complete_slot(
        &self,
        competition: &Competition,
        slot: BackendResult,
        word: &str,
    ) -> SlotOutcome {
        let completion = match self.roster.get(&slot.backend_name) {
            Some(spec) => {
                let _permit = self.permits.acquire().await.ok();
                self.client.complete(spec, word).await
            }
            None => Completion {
                text: error_marker("backend is no longer in the roster"),
                failed: true,
                ..Completion::default()
            },
        };
        let failed = completion.failed;
        let (result_id, backend) = (slot.id, slot.backend_name.clone());
        let contestant = competition.is_contestant(&backend);

        // Durable first, so readiness seen in memory is always backed by rows.
        let (persisted, recorded) = match self.store.complete_result(slot.id, &completion) {
            Ok(true) => (
                true,
                Some(BackendResult {
                    state: ResultState::Completed(completion),
                    ..slot
                }),
            ),
            Ok(false) => {
                // Completed elsewhere first; that row is the truth.
                let existing = self.store.get_result(slot.id).ok().flatten();
                (false, existing.filter(|r| r.is_completed()))
            }
            Err(e) => {
                tracing::error!(
                    event = "competition.persist_failed",
                    result_id,
                    backend = %backend,
                    error = %e,
                );
                (false, None)
            }
        };

        tracing::info!(
            event = "competition.backend_done",
            suggestion_id = competition.suggestion_id(),
            result_id,
            backend = %backend,
            contestant,
            failed,
            persisted,
        );

        // A row that never reached storage stays pending in memory too.
        let became_ready = recorded.map_or(false, |r| competition.record(r));
        SlotOutcome {
            failed,
            persisted,
            became_ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_groups_before_building_ballot() {
        let mk = |pos: u32, id: i64, name: &str, text: &str| Contestant {
            position: pos,
            result: BackendResult {
                id,
                suggestion_id: 1,
                backend_name: name.into(),
                backend_id: name.into(),
                state: ResultState::Completed(Completion {
                    text: text.into(),
                    ..Default::default()
                }),
            },
        };
        let p = Payload::from_contestants(&[
            mk(0, 1, "A", "hot"),
            mk(1, 2, "B", "hot"),
            mk(2, 3, "C", "black"),
        ]);
        assert_eq!(p.groups.len(), 2);
        assert_eq!(p.ballot.len(), 2);
        assert_eq!(p.ballot[0].result_ids, vec![1, 2]);
        assert_eq!(p.ballot[1].slot, 1);
    }

    #[test]
    fn options_follow_config() {
        let cfg = PunchlineConfig {
            contestants: 3,
            competition_grace_secs: 5,
            max_in_flight: 2,
            ..Default::default()
        };
        let opts = OrchestratorOptions::from(&cfg);
        assert_eq!(opts.contestants, 3);
        assert_eq!(opts.grace, Duration::from_secs(5));
        assert_eq!(opts.max_in_flight, 2);
    }
}
