use super::{exit_codes, report_error, Context};
use crate::cli::args::VoteArgs;
use punchline_core::{Ledger, Voter, VoterSession};

pub fn run(ctx: &Context, args: VoteArgs) -> anyhow::Result<i32> {
    let store = ctx.open_store()?;
    let session = VoterSession::load_or_issue(&ctx.session_path())?;
    let voter = Voter::new(&args.ip, &session);

    let receipt = match Ledger::new(store).vote(&args.game_id, &args.result_ids, &voter) {
        Ok(r) => r,
        Err(e) => return report_error(e),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        println!(
            "winner: \"{}\" by {}",
            receipt.winning_text,
            receipt.credited_backends.join(", ")
        );
        if receipt.previous_winner.is_some() {
            println!("(replaced an earlier vote on this game)");
        }
    }
    Ok(exit_codes::OK)
}
