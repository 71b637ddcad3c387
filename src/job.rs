//! The per-novel generation loop.
//!
//! One job owns one accumulating text and drives it to a target length:
//! assemble a prompt, call the backend under the retry policy, sanitize,
//! reject duplicated chunks, merge, checkpoint, report progress. The loop
//! also schedules summarization, the long-text quality pass, the one-shot
//! ending, and reacts to the pool's pause/stop signals. All job state is
//! owned here; the only shared pieces are the control signals and the
//! checkpoint store.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::checkpoint::{CheckpointState, CheckpointStore};
use crate::config::{GenerationConfig, RetryConfig};
use crate::control::Controls;
use crate::error::JobError;
use crate::llm::retry::{RetryOutcome, RetryPolicy};
use crate::llm::{GenerationParams, TextGenerator};
use crate::prompt::{self, PromptContext};
use crate::setup::NovelSetup;
use crate::summarize::Summarizer;
use crate::text::dedup::{DedupOptions, dedup_paragraphs};
use crate::text::sanitize::{SanitizeOptions, sanitize};
use crate::text::{merge, similarity};
use crate::util;

/// Fraction of the target at which the ending chunk is generated.
const ENDING_FRACTION: f64 = 0.9;
/// Paragraphs at least this long (in chars) count for containment checks.
const DUP_PARAGRAPH_MIN_CHARS: usize = 20;
/// The quality pass splices its cleaned tail in only past this shrinkage.
const QUALITY_SHRINK_FRACTION: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Generating,
    Paused,
    Summarizing,
    Ending,
    Completed,
    Stopped,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Stopped | JobPhase::Failed)
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobPhase::Idle => "idle",
            JobPhase::Generating => "generating",
            JobPhase::Paused => "paused",
            JobPhase::Summarizing => "summarizing",
            JobPhase::Ending => "ending",
            JobPhase::Completed => "completed",
            JobPhase::Stopped => "stopped",
            JobPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Mutable state of one job, preloaded when continuing from a checkpoint.
#[derive(Debug, Clone)]
pub struct JobState {
    pub setup: NovelSetup,
    pub text: String,
    pub target_length: usize,
}

/// A progress snapshot, mirrored to the log and to the status channel.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub job_id: Uuid,
    pub genre: String,
    pub phase: JobPhase,
    pub current_chars: usize,
    pub target_chars: usize,
    pub percent: f64,
    pub eta_secs: Option<u64>,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub state: JobState,
    pub phase: JobPhase,
}

pub struct GenerationLoop {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn CheckpointStore>,
    retry: RetryPolicy,
    params: GenerationParams,
    summarizer: Summarizer,
    gen_cfg: GenerationConfig,
    retry_cfg: RetryConfig,
    context_budget: usize,
    status: Option<mpsc::UnboundedSender<StatusEvent>>,
}

impl GenerationLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn CheckpointStore>,
        retry: RetryPolicy,
        params: GenerationParams,
        summarizer: Summarizer,
        gen_cfg: GenerationConfig,
        retry_cfg: RetryConfig,
        context_budget: usize,
        status: Option<mpsc::UnboundedSender<StatusEvent>>,
    ) -> Self {
        Self {
            generator,
            store,
            retry,
            params,
            summarizer,
            gen_cfg,
            retry_cfg,
            context_budget,
            status,
        }
    }

    fn sanitize_opts(&self) -> SanitizeOptions {
        SanitizeOptions {
            long_text_threshold: self.gen_cfg.long_text_threshold,
            dedup: self.dedup_opts(),
        }
    }

    fn dedup_opts(&self) -> DedupOptions {
        DedupOptions {
            similarity_threshold: self.gen_cfg.paragraph_similarity_threshold,
            ..DedupOptions::default()
        }
    }

    /// Drive `state` until a terminal phase.
    pub async fn run(&self, mut state: JobState, mut controls: Controls) -> JobOutcome {
        let started = Instant::now();
        let start_len = state.text.len();
        let mut len_at_last_summary = state.text.len();
        let mut len_at_last_quality = state.text.len();

        info!(
            id = %state.setup.id,
            genre = %state.setup.genre,
            preloaded_chars = start_len,
            target = state.target_length,
            "job starting"
        );
        self.report(&state, JobPhase::Idle, started, start_len);

        loop {
            if controls.is_stopped() {
                return self.finish(state, JobPhase::Stopped).await;
            }

            if controls.is_paused() {
                if !self.wait_while_paused(&state, &mut controls, started, start_len).await {
                    return self.finish(state, JobPhase::Stopped).await;
                }
                continue;
            }

            if self.gen_cfg.create_ending
                && state.text.len() as f64 >= state.target_length as f64 * ENDING_FRACTION
            {
                match self.step(&mut state, &mut controls, true).await {
                    StepResult::Stopped => return self.finish(state, JobPhase::Stopped).await,
                    StepResult::Advanced | StepResult::Retry => {}
                }
                return self.finish(state, JobPhase::Completed).await;
            }

            if state.text.len() >= state.target_length {
                return self.finish(state, JobPhase::Completed).await;
            }

            // saturating: the quality pass may have shrunk the text below
            // either mark since it was last taken.
            if self.gen_cfg.summary_interval > 0
                && state.text.len().saturating_sub(len_at_last_summary)
                    >= self.gen_cfg.summary_interval
            {
                self.report(&state, JobPhase::Summarizing, started, start_len);
                match self
                    .summarizer
                    .summarize(&state.text, &state.setup, &mut controls)
                    .await
                {
                    Ok(summary) => {
                        state.setup.summaries.push(summary);
                        len_at_last_summary = state.text.len();
                        self.checkpoint(&state).await;
                    }
                    Err(_) => continue,
                }
                continue;
            }

            self.report(&state, JobPhase::Generating, started, start_len);
            match self.step(&mut state, &mut controls, false).await {
                StepResult::Stopped => return self.finish(state, JobPhase::Stopped).await,
                StepResult::Advanced => {
                    if state.text.len() > self.gen_cfg.long_text_threshold
                        && state.text.len().saturating_sub(len_at_last_quality)
                            >= self.gen_cfg.quality_check_interval
                    {
                        self.quality_pass(&mut state);
                        len_at_last_quality = state.text.len();
                        len_at_last_summary = len_at_last_summary.min(state.text.len());
                    }
                    self.checkpoint(&state).await;
                }
                StepResult::Retry => {}
            }
        }
    }

    /// One generation step: prompt, call, sanitize, duplicate check, merge.
    async fn step(
        &self,
        state: &mut JobState,
        controls: &mut Controls,
        ending: bool,
    ) -> StepResult {
        if ending {
            self.report_phase(state, JobPhase::Ending);
        }

        let prompt = self.assemble_prompt(state, ending);
        let raw = match self
            .retry
            .run(
                self.generator.as_ref(),
                &prompt,
                &self.params,
                &state.setup.language,
                controls,
            )
            .await
        {
            RetryOutcome::Success(raw) => raw,
            RetryOutcome::Interrupted => {
                return if controls.is_stopped() {
                    StepResult::Stopped
                } else {
                    // Paused mid-call; the outer loop handles the pause.
                    StepResult::Retry
                };
            }
            RetryOutcome::Exhausted(err) => {
                return self.step_error(state, controls, err).await;
            }
        };

        let mut chunk = sanitize(&raw, state.text.len(), &self.sanitize_opts());

        if !ending && self.is_duplicate(&chunk, &state.text) {
            warn!(id = %state.setup.id, "chunk duplicates recent text; regenerating once");
            let harder = prompt::strengthen_anti_repetition(&prompt, &state.setup.language);
            match self
                .retry
                .run(
                    self.generator.as_ref(),
                    &harder,
                    &self.params,
                    &state.setup.language,
                    controls,
                )
                .await
            {
                RetryOutcome::Success(raw) => {
                    chunk = sanitize(&raw, state.text.len(), &self.sanitize_opts());
                    if self.is_duplicate(&chunk, &state.text) {
                        warn!(id = %state.setup.id, "regenerated chunk still similar; accepting it");
                    }
                }
                RetryOutcome::Interrupted => {
                    return if controls.is_stopped() {
                        StepResult::Stopped
                    } else {
                        StepResult::Retry
                    };
                }
                RetryOutcome::Exhausted(err) => {
                    return self.step_error(state, controls, err).await;
                }
            }
        }

        if chunk.is_empty() {
            warn!(id = %state.setup.id, "sanitization left nothing to merge");
            return StepResult::Retry;
        }

        state.text = merge::merge(&state.text, &chunk);
        StepResult::Advanced
    }

    fn assemble_prompt(&self, state: &JobState, ending: bool) -> String {
        let ctx = PromptContext {
            setup: &state.setup,
            current_text: &state.text,
            context_budget: self.context_budget,
            long_text: state.text.len() > self.gen_cfg.long_text_threshold,
            ending,
        };
        let mut rng = rand::thread_rng();
        prompt::assemble(&ctx, &mut rng)
    }

    /// A step failed after all retries: log, checkpoint, cool down, and let
    /// the loop re-enter generation.
    async fn step_error(
        &self,
        state: &JobState,
        controls: &mut Controls,
        last: crate::error::LlmError,
    ) -> StepResult {
        let err = JobError::RetriesExhausted {
            attempts: self.retry_cfg.max_attempts,
            last,
        };
        error!(id = %state.setup.id, %err, "generation step failed; cooling down");
        self.checkpoint(state).await;
        if !controls
            .interruptible_sleep(self.retry_cfg.step_cooldown)
            .await
            && controls.is_stopped()
        {
            return StepResult::Stopped;
        }
        StepResult::Retry
    }

    /// Whether `chunk` repeats the trailing window of the document: either
    /// a full paragraph of the chunk appears verbatim, or the chunk as a
    /// whole is too similar.
    fn is_duplicate(&self, chunk: &str, text: &str) -> bool {
        if chunk.is_empty() || text.is_empty() {
            return false;
        }
        let tail = util::tail_window(text, self.gen_cfg.dup_window);

        for paragraph in chunk.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.chars().count() >= DUP_PARAGRAPH_MIN_CHARS && tail.contains(paragraph) {
                return true;
            }
        }
        similarity::score(chunk, tail) > self.gen_cfg.step_similarity_threshold
    }

    /// Long-text quality pass: re-dedup the trailing stretch and splice the
    /// cleaned version in when it shrank meaningfully. The only place the
    /// text is allowed to get shorter.
    fn quality_pass(&self, state: &mut JobState) {
        let window = self.gen_cfg.quality_check_interval.saturating_mul(2);
        let tail = util::tail_window(&state.text, window);
        if tail.is_empty() {
            return;
        }
        let cleaned = dedup_paragraphs(tail, &self.dedup_opts());
        if (cleaned.len() as f64) < tail.len() as f64 * QUALITY_SHRINK_FRACTION {
            info!(
                id = %state.setup.id,
                before = tail.len(),
                after = cleaned.len(),
                "quality pass spliced a cleaned tail"
            );
            let keep = state.text.len() - tail.len();
            state.text.truncate(keep);
            state.text = merge::merge(&state.text, &cleaned);
        }
    }

    /// Checkpoint, pause-poll until resumed, then re-validate the backend.
    /// Returns `false` when the stop latch fired while paused.
    async fn wait_while_paused(
        &self,
        state: &JobState,
        controls: &mut Controls,
        started: Instant,
        start_len: usize,
    ) -> bool {
        info!(id = %state.setup.id, "job pausing");
        self.report(state, JobPhase::Paused, started, start_len);
        self.checkpoint(state).await;

        while controls.is_paused() {
            if controls.is_stopped() {
                return false;
            }
            controls.interruptible_sleep(self.retry_cfg.poll_tick).await;
        }

        // The backend may have gone away during a long pause.
        while !self.generator.is_alive().await {
            if controls.is_stopped() {
                return false;
            }
            warn!(id = %state.setup.id, "backend unreachable after pause; waiting");
            controls.interruptible_sleep(self.retry_cfg.poll_tick).await;
        }

        info!(id = %state.setup.id, "job resuming");
        !controls.is_stopped()
    }

    async fn finish(&self, state: JobState, phase: JobPhase) -> JobOutcome {
        self.checkpoint(&state).await;
        info!(
            id = %state.setup.id,
            genre = %state.setup.genre,
            %phase,
            chars = state.text.len(),
            "job finished"
        );
        self.report_phase(&state, phase);
        JobOutcome { state, phase }
    }

    /// A checkpoint failure never kills the job; the text lives on in
    /// memory and the next save covers it.
    async fn checkpoint(&self, state: &JobState) {
        let snapshot = CheckpointState {
            setup: state.setup.clone(),
            text: state.text.clone(),
            model: self.params.model.clone(),
            target_length: state.target_length,
        };
        if let Err(err) = self.store.save(&snapshot).await {
            error!(id = %state.setup.id, %err, "checkpoint write failed; continuing");
        }
    }

    fn report(&self, state: &JobState, phase: JobPhase, started: Instant, start_len: usize) {
        let current = state.text.len();
        let percent = if state.target_length > 0 {
            (current as f64 / state.target_length as f64 * 100.0).min(100.0)
        } else {
            100.0
        };
        let elapsed = started.elapsed().as_secs_f64();
        let produced = current.saturating_sub(start_len);
        let eta_secs = if produced > 0 && elapsed > 0.0 && current < state.target_length {
            let rate = produced as f64 / elapsed;
            Some(((state.target_length - current) as f64 / rate) as u64)
        } else {
            None
        };

        info!(
            id = %state.setup.id,
            %phase,
            percent = format!("{percent:.1}"),
            chars = current,
            target = state.target_length,
            eta_secs,
            "progress"
        );
        self.send(StatusEvent {
            job_id: state.setup.id,
            genre: state.setup.genre.clone(),
            phase,
            current_chars: current,
            target_chars: state.target_length,
            percent,
            eta_secs,
        });
    }

    fn report_phase(&self, state: &JobState, phase: JobPhase) {
        let current = state.text.len();
        let percent = if state.target_length > 0 {
            (current as f64 / state.target_length as f64 * 100.0).min(100.0)
        } else {
            100.0
        };
        self.send(StatusEvent {
            job_id: state.setup.id,
            genre: state.setup.genre.clone(),
            phase,
            current_chars: current,
            target_chars: state.target_length,
            percent,
            eta_secs: None,
        });
    }

    fn send(&self, event: StatusEvent) {
        if let Some(status) = &self.status {
            let _ = status.send(event);
        }
    }
}

enum StepResult {
    /// New text was merged in.
    Advanced,
    /// Nothing merged; the loop decides what happens next.
    Retry,
    /// The stop latch fired mid-step.
    Stopped,
}
