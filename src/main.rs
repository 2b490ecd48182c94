use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use persona::planner::FollowUp;
use persona::services::llm::LlmService;
use persona::{AnswerSource, Capabilities, Engine, EngineConfig, Reply, SharedFactStore};

/// Personal fact engine
///
/// Reads one request from stdin, keeps the user's fact profile up to date and
/// either answers directly or plans the task, asking follow-up questions on stdin.
#[derive(Parser, Debug)]
#[command(name = "persona")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, value_name = "PATH", default_value = "persona.toml")]
    config: PathBuf,

    /// Fact store file, overriding the configured path
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,
}

/// Prints follow-up questions and reads one answer line.
struct ConsoleAnswers {
    lines: Lines<BufReader<Stdin>>,
}

#[async_trait]
impl AnswerSource for ConsoleAnswers {
    async fn answer(&mut self, questions: &[FollowUp]) -> Result<String> {
        let mut stdout = tokio::io::stdout();
        for followup in questions {
            stdout.write_all(format!("{}\n", followup.question).as_bytes()).await?;
        }
        stdout.write_all(b"Answer followup question:> ").await?;
        stdout.flush().await?;

        self.lines
            .next_line()
            .await?
            .context("stdin closed while waiting for an answer")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Config
    let mut config = EngineConfig::load(&cli.config)?;
    if let Some(store) = cli.store {
        config.store.path = store;
    }

    // 2. Logging (RUST_LOG wins over the configured level)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    tracing::info!("Fact store: {}", config.store.path.display());

    // 3. Engine
    let provider = Arc::new(LlmService::new(&config)?);
    let store = SharedFactStore::open(&config.store.path);
    let engine = Engine::new(Capabilities::from_provider(provider), store, &config);

    // 4. Cancellation
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling conversation");
            ctrl_c.cancel();
        }
    });

    // 5. One request
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Enter user query: ").await?;
    stdout.flush().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let query = match lines.next_line().await? {
        Some(line) if !line.trim().is_empty() => line,
        _ => {
            tracing::warn!("Empty query, nothing to do");
            return Ok(());
        }
    };

    let mut answers = ConsoleAnswers { lines };
    let outcome = engine.handle(&query, &mut answers, &cancel).await?;

    if let Some(Err(e)) = &outcome.reconciliation {
        tracing::error!("Profile update failed: {}", e);
    }

    match outcome.reply {
        Reply::Direct(text) => println!("{}", text),
        Reply::Planned(task) => {
            if let Some(note) = &task.user_response {
                println!("{}", note);
            }
            println!("{}", task.result);
        }
    }

    let snapshot = engine.telemetry().snapshot();
    tracing::debug!("Session telemetry: {:?}", snapshot);

    Ok(())
}
