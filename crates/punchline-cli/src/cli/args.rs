use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "punchline",
    version,
    about = "Crowd-voted completion contests between LLM backends"
)]
pub struct Cli {
    /// SQLite database (defaults to PUNCHLINE_DB or .punchline/punchline.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Roster YAML (defaults to PUNCHLINE_ROSTER or the built-in roster)
    #[arg(long, global = true)]
    pub roster: Option<PathBuf>,

    /// Use the offline scripted backend instead of OpenRouter
    #[arg(long, global = true)]
    pub fake: bool,

    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Submit a word and print the ballot once its contestants have answered
    Submit(SubmitArgs),
    /// Show progress of a game
    Status(StatusArgs),
    /// Vote for a ballot entry (all result ids of one entry, or any one of them)
    Vote(VoteArgs),
    /// Per-backend wins, appearances and averages
    Leaderboard(OutputArgs),
    /// Token and cost totals
    Costs(OutputArgs),
    /// Print the active roster
    Roster(OutputArgs),
    /// Write a sample roster file
    InitRoster(InitRosterArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct OutputArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SubmitArgs {
    pub word: String,

    /// Voter address recorded with later votes
    #[arg(long, default_value = "127.0.0.1")]
    pub ip: String,

    /// Seconds to wait for contestants (0 returns right away)
    #[arg(long, default_value_t = 60)]
    pub wait: u64,

    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StatusArgs {
    pub game_id: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct VoteArgs {
    pub game_id: String,

    #[arg(required = true, num_args = 1..)]
    pub result_ids: Vec<i64>,

    #[arg(long, default_value = "127.0.0.1")]
    pub ip: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitRosterArgs {
    #[arg(default_value = "punchline-roster.yaml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
