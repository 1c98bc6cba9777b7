//! Merges contestant results that produced byte-identical text.
//!
//! Groups keep the order in which their text first appears among the
//! contestants. Numeric stats are running means updated as each member joins.

use crate::model::{BackendResult, Contestant};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub members: u32,
    pub latency_secs: f64,
    pub completion_tokens: f64,
    pub reasoning_tokens: f64,
    pub prompt_tokens: f64,
    pub cost: f64,
}

impl GroupStats {
    fn join(&mut self, r: &BackendResult) {
        let Some(c) = r.completion() else {
            return;
        };
        self.members += 1;
        let n = self.members as f64;
        let step = |mean: &mut f64, x: f64| *mean += (x - *mean) / n;
        step(&mut self.latency_secs, c.latency_secs);
        step(&mut self.completion_tokens, c.completion_tokens as f64);
        step(&mut self.reasoning_tokens, c.reasoning_tokens as f64);
        step(&mut self.prompt_tokens, c.prompt_tokens as f64);
        step(&mut self.cost, c.cost);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayGroup {
    pub text: String,
    /// Display names of the backends that produced `text`.
    pub backends: Vec<String>,
    pub result_ids: Vec<i64>,
    /// Display positions of the members, parallel to `result_ids`.
    pub positions: Vec<u32>,
    pub stats: GroupStats,
}

/// What a voter sees: text and the ids to submit, no backend names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotEntry {
    pub slot: u32,
    pub text: String,
    pub result_ids: Vec<i64>,
}

/// Groups completed contestants by exact text. Pending entries are skipped.
pub fn group(contestants: &[Contestant]) -> Vec<DisplayGroup> {
    let mut groups: Vec<DisplayGroup> = Vec::new();

    for c in contestants {
        let Some(text) = c.result.text() else {
            continue;
        };
        let idx = match groups.iter().position(|g| g.text == text) {
            Some(i) => i,
            None => {
                groups.push(DisplayGroup {
                    text: text.to_string(),
                    backends: Vec::new(),
                    result_ids: Vec::new(),
                    positions: Vec::new(),
                    stats: GroupStats::default(),
                });
                groups.len() - 1
            }
        };
        let g = &mut groups[idx];
        g.backends.push(c.result.backend_name.clone());
        g.result_ids.push(c.result.id);
        g.positions.push(c.position);
        g.stats.join(&c.result);
    }

    groups
}

pub fn ballot(groups: &[DisplayGroup]) -> Vec<BallotEntry> {
    groups
        .iter()
        .enumerate()
        .map(|(slot, g)| BallotEntry {
            slot: slot as u32,
            text: g.text.clone(),
            result_ids: g.result_ids.clone(),
        })
        .collect()
}
