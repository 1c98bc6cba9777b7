use crate::cli::args::{Cli, Command};
use punchline_core::config::PunchlineConfig;
use punchline_core::providers::llm::fake::FakeBackend;
use punchline_core::providers::llm::openrouter::OpenRouterClient;
use punchline_core::providers::llm::CompletionBackend;
use punchline_core::storage::Store;
use punchline_core::{CompetitionError, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;

pub mod board;
pub mod render;
pub mod roster;
pub mod status;
pub mod submit;
pub mod vote;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const INTERNAL: i32 = 1;
    pub const INVALID_INPUT: i32 = 2;
    pub const NOT_FOUND: i32 = 3;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let ctx = Context::new(&cli);
    match cli.cmd {
        Command::Submit(args) => submit::run(&ctx, args).await,
        Command::Status(args) => status::run(&ctx, args),
        Command::Vote(args) => vote::run(&ctx, args),
        Command::Leaderboard(args) => board::leaderboard(&ctx, args),
        Command::Costs(args) => board::costs(&ctx, args),
        Command::Roster(args) => roster::show(&ctx, args),
        Command::InitRoster(args) => roster::init(args),
    }
}

/// Settings shared by every subcommand: environment first, flags on top.
pub struct Context {
    pub config: PunchlineConfig,
    pub fake: bool,
}

impl Context {
    pub fn new(cli: &Cli) -> Self {
        let mut config = PunchlineConfig::from_env();
        if let Some(db) = &cli.db {
            config.db_path = db.clone();
        }
        if let Some(roster) = &cli.roster {
            config.roster_path = Some(roster.clone());
        }
        Self {
            config,
            fake: cli.fake,
        }
    }

    pub fn open_store(&self) -> anyhow::Result<Store> {
        let store = Store::open(&self.config.db_path)?;
        store.init_schema()?;
        Ok(store)
    }

    pub fn backend(&self) -> anyhow::Result<Arc<dyn CompletionBackend>> {
        if self.fake {
            return Ok(Arc::new(FakeBackend::new()));
        }
        match &self.config.api_key {
            Some(key) => Ok(Arc::new(OpenRouterClient::new(
                self.config.base_url.clone(),
                key.clone(),
            ))),
            None => anyhow::bail!("OPENROUTER_API_KEY is not set (use --fake for offline runs)"),
        }
    }

    pub fn orchestrator(&self) -> anyhow::Result<Orchestrator> {
        let roster = self.config.load_roster()?;
        let backend = self.backend()?;
        Ok(Orchestrator::from_config(
            &self.config,
            self.open_store()?,
            roster,
            backend,
        ))
    }

    /// Voter session file, kept next to the database.
    pub fn session_path(&self) -> PathBuf {
        match self.config.db_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join("session.json"),
            _ => PathBuf::from("session.json"),
        }
    }
}

/// Client errors become exit codes; storage failures propagate.
pub fn report_error(e: CompetitionError) -> anyhow::Result<i32> {
    if !e.is_client_error() {
        return Err(e.into());
    }
    let code = match e {
        CompetitionError::NotFound { .. } => exit_codes::NOT_FOUND,
        _ => exit_codes::INVALID_INPUT,
    };
    eprintln!("error: {}", e);
    Ok(code)
}
