//! Binary entrypoint: read one push payload from stdin, write the analysis
//! to stdout.
//!
//! Output is either:
//! - the AnalysisResult JSON (or the Markdown report with `--format markdown`)
//! - an ErrorOutput, with exit status 2, when the payload is rejected
//!
//! With `--leaderboard` or `--developer <AUTHOR>` no payload is read; the
//! developer stats of the history log are printed instead.
//!
//! An unreadable history log never fails the run: analysis continues with a
//! flat trend and nothing is persisted.
//!
//! Logs go to stderr; `RUST_LOG` overrides the default level.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::AsyncReadExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use quality_engine::types::ErrorOutput;
use quality_engine::{
  open_or_unavailable, Config, DisabledReviewer, Engine, EngineError, HistoryStore, HttpReviewer,
  MemoryHistoryStore, Reviewer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
  Json,
  Markdown,
}

#[derive(Debug, Parser)]
#[command(name = "quality-engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Analyze the quality of one push read from stdin", long_about = None)]
struct Cli {
  /// TOML config file; defaults apply when omitted.
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// JSON-lines history log; in-memory when omitted.
  #[arg(long)]
  history: Option<PathBuf>,

  #[arg(short, long, value_enum, default_value_t = Format::Json)]
  format: Format,

  /// Review service endpoint; overrides `review.endpoint`.
  #[arg(long, env = "QUALITY_ENGINE_REVIEW_URL")]
  review_url: Option<String>,

  /// Print the history's developer leaderboard instead of analyzing stdin.
  #[arg(long, conflicts_with = "developer")]
  leaderboard: bool,

  /// Print one developer's stats instead of analyzing stdin.
  #[arg(long, value_name = "AUTHOR")]
  developer: Option<String>,

  /// Debug logging.
  #[arg(short, long)]
  verbose: bool,
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .try_init()
    .ok();
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let mut config = match &cli.config {
    Some(path) => {
      Config::load(path).with_context(|| format!("loading config {}", path.display()))?
    }
    None => Config::default(),
  };
  if let Some(url) = cli.review_url.clone() {
    config.review.endpoint = Some(url);
  }

  let history: Arc<dyn HistoryStore> = match &cli.history {
    Some(path) => open_or_unavailable(path).await,
    None => Arc::new(MemoryHistoryStore::new()),
  };
  let reviewer: Arc<dyn Reviewer> = match &config.review.endpoint {
    Some(url) => {
      let http = HttpReviewer::new(url.clone(), config.review.max_diff_chars)?;
      debug!(endpoint = http.endpoint(), "review enabled");
      Arc::new(http)
    }
    None => Arc::new(DisabledReviewer),
  };

  let engine = Engine::new(config, history, reviewer).context("building engine")?;
  debug!(
    lookback = engine.config().trend.lookback,
    flat_epsilon = engine.config().trend.flat_epsilon,
    gate_threshold = engine.config().score.gate_threshold,
    "engine ready"
  );

  if cli.leaderboard {
    let board = engine.leaderboard().await.context("reading history")?;
    println!("{}", serde_json::to_string_pretty(&board)?);
    return Ok(());
  }
  if let Some(author) = &cli.developer {
    match engine.developer(author).await.context("reading history")? {
      Some(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
      None => {
        let out = ErrorOutput::new(format!("no recorded pushes for {}", author))
          .with_field("developer");
        println!("{}", serde_json::to_string(&out)?);
        std::process::exit(1);
      }
    }
    return Ok(());
  }

  let mut input = String::new();
  tokio::io::stdin()
    .read_to_string(&mut input)
    .await
    .context("reading stdin")?;

  let result = match engine.analyze_str(&input).await {
    Ok(r) => r,
    Err(e) => {
      let EngineError::InvalidPayload { field, reason } = &e;
      let out = ErrorOutput::new(reason.clone()).with_field(field.clone());
      println!("{}", serde_json::to_string(&out)?);
      std::process::exit(2);
    }
  };

  match cli.format {
    Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    Format::Markdown => print!("{}", engine.render(&result).markdown),
  }
  Ok(())
}
