use super::{exit_codes, render, Context};
use crate::cli::args::{InitRosterArgs, OutputArgs};
use punchline_core::roster::write_sample_roster;

pub fn show(ctx: &Context, args: OutputArgs) -> anyhow::Result<i32> {
    let roster = ctx.config.load_roster()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&roster)?);
    } else {
        print!("{}", render::roster(&roster));
    }
    Ok(exit_codes::OK)
}

pub fn init(args: InitRosterArgs) -> anyhow::Result<i32> {
    if args.path.exists() && !args.force {
        eprintln!(
            "error: {} already exists (pass --force to overwrite)",
            args.path.display()
        );
        return Ok(exit_codes::INVALID_INPUT);
    }
    write_sample_roster(&args.path)?;
    eprintln!("wrote file: {}", args.path.display());
    Ok(exit_codes::OK)
}
