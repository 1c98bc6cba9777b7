use anyhow::Result;
use clap::Parser;
use punchline_core::providers::llm::fake::FakeBackend;
use punchline_core::providers::llm::openrouter::OpenRouterClient;
use punchline_core::providers::llm::CompletionBackend;
use punchline_core::storage::Store;
use punchline_core::Orchestrator;
use punchline_server::config::ServerConfig;
use punchline_server::server::Server;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database path (overrides PUNCHLINE_DB)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Roster YAML (overrides PUNCHLINE_ROSTER)
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Answer with the offline fake backend
    #[arg(long)]
    fake: bool,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = ServerConfig::from_env();
    if let Some(db) = args.db {
        cfg.core.db_path = db;
    }
    if let Some(roster) = args.roster {
        cfg.core.roster_path = Some(roster);
    }

    init_logging(&cfg.log_level);

    let backend: Arc<dyn CompletionBackend> = if args.fake {
        Arc::new(FakeBackend::new())
    } else {
        match &cfg.core.api_key {
            Some(key) => Arc::new(OpenRouterClient::new(cfg.core.base_url.clone(), key.clone())),
            None => anyhow::bail!("OPENROUTER_API_KEY is not set (use --fake for offline runs)"),
        }
    };

    tracing::info!(
        event = "server_start",
        db = %cfg.core.db_path.display(),
        fake = args.fake,
        request_timeout_ms = cfg.request_timeout_ms,
        max_msg_bytes = cfg.max_msg_bytes,
    );

    let store = Store::open(&cfg.core.db_path)?;
    store.init_schema()?;
    let roster = cfg.core.load_roster()?;
    let orchestrator = Orchestrator::from_config(&cfg.core, store, roster, backend);

    let server = Server::new(orchestrator, cfg);
    server
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}
