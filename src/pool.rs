//! Concurrent execution of generation jobs.
//!
//! The pool runs every job as its own task behind a semaphore, so at most
//! `max_workers` jobs generate at once while the rest wait for a permit.
//! Pause, resume, and stop broadcast to all jobs through one
//! [`ControlHandle`]; after a stop the pool waits a bounded grace period
//! for jobs to write their final checkpoints before abandoning them.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::checkpoint::FsCheckpointStore;
use crate::config::GenerationConfig;
use crate::control::ControlHandle;
use crate::error::Error;
use crate::job::{GenerationLoop, JobOutcome, JobState};
use crate::setup::{self, NovelSetup};
use crate::util;

/// How long a stopped pool waits for jobs to finish their final saves.
const STOP_GRACE: Duration = Duration::from_secs(30);
/// Texts longer than this are excerpted in the batch summary file.
const EXCERPT_THRESHOLD: usize = 5_000;
/// Head and tail excerpt size for the batch summary.
const EXCERPT_LEN: usize = 1_000;

pub struct JobPool {
    runner: Arc<GenerationLoop>,
    handle: ControlHandle,
    cfg: GenerationConfig,
}

impl JobPool {
    pub fn new(runner: GenerationLoop, handle: ControlHandle, cfg: GenerationConfig) -> Self {
        Self {
            runner: Arc::new(runner),
            handle,
            cfg,
        }
    }

    pub fn handle(&self) -> &ControlHandle {
        &self.handle
    }

    /// Build a fresh batch of jobs from the configuration: one genre per
    /// job from the batch list, random genres, or the single configured
    /// genre for all.
    pub fn build_fresh_jobs(&self) -> Result<Vec<JobState>, Error> {
        let custom_prompt = match &self.cfg.custom_prompt {
            Some(raw) => Some(setup::validate_custom_prompt(raw)?.template),
            None => None,
        };

        let mut rng = rand::thread_rng();
        let mut jobs = Vec::with_capacity(self.cfg.num_novels);
        for i in 0..self.cfg.num_novels {
            let genre = if let Some(genre) = self.cfg.batch_genres.get(i) {
                genre.clone()
            } else if self.cfg.random_genres {
                setup::random_genre(&mut rng)
            } else {
                self.cfg.genre.clone()
            };

            let mut novel = NovelSetup::synthesize(&genre, &self.cfg.language, &mut rng);
            novel.custom_prompt = custom_prompt.clone();
            jobs.push(JobState {
                setup: novel,
                text: String::new(),
                target_length: self.cfg.target_length,
            });
        }
        Ok(jobs)
    }

    /// Build a continuation batch from every resumable checkpoint pair in
    /// `dir`. Jobs whose text already meets the target get the target
    /// bumped by one more full run's worth.
    pub async fn discover_jobs(&self, dir: &Path) -> Result<Vec<JobState>, Error> {
        let paths = FsCheckpointStore::discover(dir)?;
        if paths.is_empty() {
            warn!(dir = %dir.display(), "no resumable checkpoints found");
        }

        let mut jobs = Vec::with_capacity(paths.len());
        for path in paths {
            let loaded = FsCheckpointStore::load(&path).await?;
            let mut target = self.cfg.target_length.max(loaded.target_length);
            if loaded.text.len() >= target {
                target = loaded.text.len() + self.cfg.target_length;
                info!(
                    id = %loaded.setup.id,
                    new_target = target,
                    "checkpoint already met its target; extending"
                );
            }
            jobs.push(JobState {
                setup: loaded.setup,
                text: loaded.text,
                target_length: target,
            });
        }
        Ok(jobs)
    }

    /// Run `jobs` to their terminal phases and write the batch summary
    /// artifact. Jobs that are still running `STOP_GRACE` after a stop are
    /// abandoned.
    pub async fn run(&self, jobs: Vec<JobState>, output_dir: &Path) -> Vec<JobOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.cfg.max_workers.max(1)));
        let mut tasks = JoinSet::new();

        info!(
            jobs = jobs.len(),
            max_workers = self.cfg.max_workers,
            "starting job pool"
        );
        for job in jobs {
            let runner = self.runner.clone();
            let semaphore = semaphore.clone();
            let controls = self.handle.controls();
            tasks.spawn(async move {
                // A closed semaphore cannot happen; the pool never closes it.
                let _permit = semaphore.acquire_owned().await;
                runner.run(job, controls).await
            });
        }

        let mut outcomes = Vec::new();
        loop {
            let joined = if self.handle.is_stopped() {
                match tokio::time::timeout(STOP_GRACE, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!("stop grace period elapsed; abandoning remaining jobs");
                        tasks.abort_all();
                        break;
                    }
                }
            } else {
                tasks.join_next().await
            };
            match joined {
                Some(Ok(outcome)) => outcomes.push(outcome),
                Some(Err(join_err)) => error!(%join_err, "job task failed"),
                None => break,
            }
        }

        if let Err(err) = write_batch_summary(output_dir, &outcomes).await {
            error!(%err, "failed to write batch summary");
        }
        outcomes
    }
}

/// Describe the batch in `summary.txt`: one block per novel with phase,
/// size, and an excerpt. Read-and-format only; never touches job state.
async fn write_batch_summary(dir: &Path, outcomes: &[JobOutcome]) -> std::io::Result<()> {
    if outcomes.is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir).await?;

    let mut report = String::new();
    report.push_str(&format!("Batch summary: {} novel(s)\n\n", outcomes.len()));
    for outcome in outcomes {
        let state = &outcome.state;
        report.push_str(&format!(
            "== {} ({}) ==\nphase: {}\nlength: {} chars (target {})\nsummaries recorded: {}\n",
            state.setup.genre,
            state.setup.id,
            outcome.phase,
            state.text.len(),
            state.target_length,
            state.setup.summaries.len(),
        ));
        report.push_str(&excerpt(&state.text));
        report.push('\n');
    }

    tokio::fs::write(dir.join("summary.txt"), report).await
}

fn excerpt(text: &str) -> String {
    if text.len() <= EXCERPT_THRESHOLD {
        return format!("---\n{text}\n---\n");
    }
    let head = &text[..util::floor_char_boundary(text, EXCERPT_LEN)];
    let tail = util::tail_window(text, EXCERPT_LEN);
    format!("--- opening ---\n{head}\n--- latest ---\n{tail}\n---\n")
}
