use super::{exit_codes, render, report_error, Context};
use crate::cli::args::StatusArgs;
use punchline_core::engine::orchestrator::durable_status;

/// Reads progress from the database; another process may own the run.
pub fn run(ctx: &Context, args: StatusArgs) -> anyhow::Result<i32> {
    let store = ctx.open_store()?;
    let report = match durable_status(&store, &args.game_id) {
        Ok(r) => r,
        Err(e) => return report_error(e),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render::status(&report));
    }
    Ok(exit_codes::OK)
}
