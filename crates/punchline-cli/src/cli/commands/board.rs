use super::{exit_codes, render, Context};
use crate::cli::args::OutputArgs;
use punchline_core::Ledger;

pub fn leaderboard(ctx: &Context, args: OutputArgs) -> anyhow::Result<i32> {
    let rows = Ledger::new(ctx.open_store()?).leaderboard()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("no results yet");
    } else {
        print!("{}", render::leaderboard(&rows));
    }
    Ok(exit_codes::OK)
}

pub fn costs(ctx: &Context, args: OutputArgs) -> anyhow::Result<i32> {
    let summary = Ledger::new(ctx.open_store()?).cost_summary()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render::costs(&summary));
    }
    Ok(exit_codes::OK)
}
