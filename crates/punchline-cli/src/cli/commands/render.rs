use punchline_core::model::{CostSummary, LeaderboardRow};
use punchline_core::roster::{Roster, Shaping};
use punchline_core::{Payload, StatusReport};

pub fn ballot(game_id: &str, payload: &Payload) -> String {
    let mut s = String::new();
    for entry in &payload.ballot {
        let ids: Vec<String> = entry.result_ids.iter().map(|id| id.to_string()).collect();
        s.push_str(&format!(
            "  [{}] {:<48} ids: {}\n",
            entry.slot + 1,
            entry.text,
            ids.join(",")
        ));
    }
    s.push_str(&format!(
        "vote with: punchline vote {} <ids of one entry>\n",
        game_id
    ));
    s
}

pub fn status(report: &StatusReport) -> String {
    let mut s = format!(
        "game {}: {}/{} contestants answered{}\n",
        report.game_id,
        report.completed_count,
        report.total_contestants,
        if report.ready { "" } else { " (waiting)" }
    );
    if let Some(payload) = &report.payload {
        s.push_str(&ballot(&report.game_id, payload));
    }
    s
}

pub fn shaping(shaping: &Shaping) -> String {
    match shaping {
        Shaping::Default => "default".into(),
        Shaping::ReasoningEffort(level) => format!("reasoning_effort={}", level.as_str()),
        Shaping::ReasoningBudget(tokens) => format!("reasoning_budget={}", tokens),
    }
}

pub fn roster(roster: &Roster) -> String {
    let mut s = format!("{:<24} {:<36} {}\n", "NAME", "MODEL", "SHAPING");
    for b in &roster.backends {
        s.push_str(&format!(
            "{:<24} {:<36} {}\n",
            b.name,
            b.model,
            shaping(&b.shaping)
        ));
    }
    s
}

pub fn leaderboard(rows: &[LeaderboardRow]) -> String {
    let mut s = format!(
        "{:<24} {:>5} {:>6} {:>6} {:>6} {:>6} {:>8} {:>8}\n",
        "BACKEND", "WINS", "SHOWN", "RATE", "DONE", "FAILED", "AVG_S", "AVG_TOK"
    );
    for r in rows {
        s.push_str(&format!(
            "{:<24} {:>5} {:>6} {:>5.0}% {:>6} {:>6} {:>8.2} {:>8.1}\n",
            r.backend_name,
            r.win_count,
            r.appearance_count,
            r.win_rate * 100.0,
            r.completed_count,
            r.failure_count,
            r.avg_latency_secs,
            r.avg_completion_tokens
        ));
    }
    s
}

pub fn costs(summary: &CostSummary) -> String {
    let mut s = format!(
        "total ${:.4} over {} words (${:.4} per word), {} tokens\n",
        summary.total_cost,
        summary.suggestion_count,
        summary.avg_cost_per_suggestion,
        summary.total_tokens
    );
    s.push_str(&format!(
        "{:<24} {:>6} {:>10} {:>10} {:>10}\n",
        "BACKEND", "CALLS", "TOTAL", "AVG", "OUT_TOK"
    ));
    for b in &summary.backends {
        s.push_str(&format!(
            "{:<24} {:>6} {:>10.4} {:>10.6} {:>10}\n",
            b.backend_name, b.calls, b.total_cost, b.avg_cost, b.total_completion_tokens
        ));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use punchline_core::roster::EffortLevel;

    #[test]
    fn shaping_labels() {
        assert_eq!(shaping(&Shaping::Default), "default");
        assert_eq!(
            shaping(&Shaping::ReasoningEffort(EffortLevel::Minimal)),
            "reasoning_effort=minimal"
        );
        assert_eq!(shaping(&Shaping::ReasoningBudget(0)), "reasoning_budget=0");
    }

    #[test]
    fn roster_table_lists_every_backend() {
        let out = roster(&Roster::default());
        assert!(out.contains("GPT-5"));
        assert!(out.contains("reasoning_budget=0"));
        assert_eq!(out.lines().count(), 7);
    }
}
