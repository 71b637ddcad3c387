use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use novelforge::checkpoint::FsCheckpointStore;
use novelforge::config::Config;
use novelforge::control::ControlHandle;
use novelforge::job::{GenerationLoop, JobPhase, StatusEvent};
use novelforge::llm::client::HttpTextGenerator;
use novelforge::llm::retry::RetryPolicy;
use novelforge::llm::{GenerationParams, TextGenerator};
use novelforge::pool::JobPool;
use novelforge::summarize::Summarizer;

/// Generate long-form novels incrementally via an OpenAI-compatible API.
#[derive(Parser, Debug)]
#[command(name = "novelforge", version, about)]
struct Cli {
    /// Number of novels to generate in this batch.
    #[arg(short, long)]
    novels: Option<usize>,

    /// Genre for every novel (unless --genres or --random-genres is set).
    #[arg(short, long)]
    genre: Option<String>,

    /// Comma-separated genre list, one per novel.
    #[arg(long, value_delimiter = ',')]
    genres: Vec<String>,

    /// Pick a random genre per novel.
    #[arg(long)]
    random_genres: bool,

    /// Output language code (en, zh, ...).
    #[arg(short, long)]
    language: Option<String>,

    /// Target length per novel, in characters.
    #[arg(short, long)]
    target_length: Option<usize>,

    /// Maximum number of novels generating concurrently.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Write a proper ending once a novel nears its target.
    #[arg(long)]
    ending: bool,

    /// Model identifier sent to the endpoint.
    #[arg(short, long)]
    model: Option<String>,

    /// Custom prompt template replacing the built-in genre templates.
    #[arg(long)]
    custom_prompt: Option<String>,

    /// Directory checkpoints and the batch summary are written to.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Resume every checkpoint pair found in this directory instead of
    /// starting fresh novels.
    #[arg(long)]
    continue_from: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        let g = &mut config.generation;
        if let Some(n) = self.novels {
            g.num_novels = n;
        }
        if let Some(genre) = self.genre {
            g.genre = genre;
        }
        if !self.genres.is_empty() {
            g.batch_genres = self.genres;
            g.num_novels = g.num_novels.max(g.batch_genres.len());
        }
        if self.random_genres {
            g.random_genres = true;
        }
        if let Some(language) = self.language {
            g.language = language;
        }
        if let Some(target) = self.target_length {
            g.target_length = target;
        }
        if let Some(workers) = self.workers {
            g.max_workers = workers;
        }
        if self.ending {
            g.create_ending = true;
        }
        if let Some(prompt) = self.custom_prompt {
            g.custom_prompt = Some(prompt);
        }
        if let Some(dir) = self.output_dir {
            g.output_dir = dir;
        }
        if let Some(dir) = self.continue_from {
            g.continue_from_dir = Some(dir);
        }
        if let Some(model) = self.model {
            config.api.model = model;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("loading configuration")?;
    cli.apply(&mut config);

    let generator: Arc<dyn TextGenerator> = Arc::new(HttpTextGenerator::new(&config.api));
    let store = Arc::new(FsCheckpointStore::new(config.generation.output_dir.clone()));
    let retry = RetryPolicy::new(&config.retry);
    let params = GenerationParams::from_api(&config.api);
    let summarizer = Summarizer::new(
        generator.clone(),
        retry.clone(),
        params.clone(),
        config.api.context_budget,
        config.generation.long_text_threshold,
    );

    let (status_tx, status_rx) = mpsc::unbounded_channel();
    let runner = GenerationLoop::new(
        generator,
        store,
        retry,
        params,
        summarizer,
        config.generation.clone(),
        config.retry.clone(),
        config.api.context_budget,
        Some(status_tx),
    );

    let handle = ControlHandle::new();
    let pool = JobPool::new(runner, handle.clone(), config.generation.clone());

    let jobs = match &config.generation.continue_from_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "continuing from checkpoints");
            pool.discover_jobs(dir).await.context("discovering checkpoints")?
        }
        None => pool.build_fresh_jobs().context("building job batch")?,
    };
    if jobs.is_empty() {
        warn!("nothing to generate");
        return Ok(());
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after final checkpoints");
            handle.stop();
        }
    });
    let printer = tokio::spawn(print_status(status_rx));

    let output_dir = config.generation.output_dir.clone();
    let outcomes = pool.run(jobs, &output_dir).await;
    printer.abort();

    let mut failed = 0usize;
    for outcome in &outcomes {
        info!(
            genre = %outcome.state.setup.genre,
            phase = %outcome.phase,
            chars = outcome.state.text.len(),
            "final"
        );
        if outcome.phase == JobPhase::Failed {
            failed += 1;
        }
    }
    info!(dir = %output_dir.display(), "output written");

    if failed > 0 {
        anyhow::bail!("{failed} job(s) failed");
    }
    Ok(())
}

async fn print_status(mut rx: mpsc::UnboundedReceiver<StatusEvent>) {
    while let Some(event) = rx.recv().await {
        let eta = event
            .eta_secs
            .map(|s| format!(", ETA {s}s"))
            .unwrap_or_default();
        println!(
            "[{} {}] {}: {:.1}% ({}/{} chars{eta})",
            event.genre,
            &event.job_id.simple().to_string()[..8],
            event.phase,
            event.percent,
            event.current_chars,
            event.target_chars,
        );
    }
}
