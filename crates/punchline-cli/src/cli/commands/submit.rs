use super::{exit_codes, render, report_error, Context};
use crate::cli::args::SubmitArgs;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run(ctx: &Context, args: SubmitArgs) -> anyhow::Result<i32> {
    let orch = ctx.orchestrator()?;
    let ticket = match orch.compete(&args.word) {
        Ok(t) => t,
        Err(e) => return report_error(e),
    };

    let deadline = Instant::now() + Duration::from_secs(args.wait);
    let mut status = orch.status(&ticket.game_id)?;
    while !status.ready && Instant::now() < deadline {
        tokio::time::sleep(POLL_INTERVAL).await;
        status = orch.status(&ticket.game_id)?;
    }

    // Give the rest of the roster the remaining budget before the process exits.
    let remaining = deadline.saturating_duration_since(Instant::now());
    if !remaining.is_zero() {
        let _ = tokio::time::timeout(remaining, orch.settle(ticket.suggestion_id)).await;
    }

    if args.json {
        let out = serde_json::json!({ "ticket": ticket, "status": status });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(exit_codes::OK);
    }

    println!(
        "{} \"{}\" (game {})",
        if ticket.is_new { "new word" } else { "known word" },
        ticket.word,
        ticket.game_id
    );
    print!("{}", render::status(&status));
    if !status.ready {
        println!(
            "still waiting; answers that have not landed are picked up the next time \"{}\" is submitted",
            ticket.word
        );
    }
    Ok(exit_codes::OK)
}
