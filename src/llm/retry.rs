//! Retry policy for remote generation calls.
//!
//! Every failure is retryable up to the attempt cap. Backoff grows
//! geometrically with the attempt number and stops growing at attempt 10;
//! the wait itself is sliced into short ticks so a stop or pause signal is
//! honored within one tick rather than after a full backoff.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::control::Controls;
use crate::error::LlmError;
use crate::llm::{GenerationParams, TextGenerator};
use crate::prompt;

/// Backoff growth factor per attempt.
const BACKOFF_FACTOR: f64 = 1.5;
/// Attempt number past which the backoff stops growing.
const BACKOFF_CAP_ATTEMPT: u32 = 10;

/// Result of driving one generation call through the retry policy.
#[derive(Debug)]
pub enum RetryOutcome {
    /// Raw response text from the first successful attempt.
    Success(String),
    /// A stop or pause signal aborted the attempt sequence.
    Interrupted,
    /// Every attempt failed; carries the last error seen.
    Exhausted(LlmError),
}

/// Retry policy with prompt rework on content failures.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    poll_tick: Duration,
    on_retry: Option<Arc<dyn Fn(u32) + Send + Sync>>,
}

impl RetryPolicy {
    pub fn new(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: cfg.base_delay,
            poll_tick: cfg.poll_tick,
            on_retry: None,
        }
    }

    /// Register an observer invoked with the attempt number after every
    /// failed attempt.
    pub fn with_observer(mut self, observer: Arc<dyn Fn(u32) + Send + Sync>) -> Self {
        self.on_retry = Some(observer);
        self
    }

    /// Delay before the attempt numbered `attempt` (zero-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(BACKOFF_CAP_ATTEMPT);
        self.base_delay.mul_f64(BACKOFF_FACTOR.powi(exponent as i32))
    }

    /// Drive `generator` until one attempt succeeds, the attempts are
    /// exhausted, or a control signal interrupts the sequence.
    ///
    /// `TooShort` failures strengthen the next attempt's prompt with an
    /// explicit length requirement; `Refusal` failures reframe it. Pure
    /// transport and server failures resend the prompt verbatim.
    pub async fn run(
        &self,
        generator: &dyn TextGenerator,
        prompt: &str,
        params: &GenerationParams,
        language: &str,
        controls: &mut Controls,
    ) -> RetryOutcome {
        let mut working_prompt = prompt.to_string();
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if controls.is_stopped() {
                return RetryOutcome::Interrupted;
            }

            match generator.generate(&working_prompt, params).await {
                Ok(text) => return RetryOutcome::Success(text),
                Err(error) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        %error,
                        "generation attempt failed"
                    );
                    if let Some(observer) = &self.on_retry {
                        observer(attempt + 1);
                    }
                    match &error {
                        LlmError::TooShort { .. } => {
                            working_prompt = prompt::strengthen_min_length(&working_prompt, language);
                        }
                        LlmError::Refusal => {
                            working_prompt = prompt::reframe_after_refusal(&working_prompt, language);
                        }
                        _ => {}
                    }
                    last_error = Some(error);
                }
            }

            if attempt + 1 < self.max_attempts && !self.backoff_wait(attempt, controls).await {
                return RetryOutcome::Interrupted;
            }
        }

        RetryOutcome::Exhausted(last_error.unwrap_or(LlmError::Transport(
            "no attempts were made".to_string(),
        )))
    }

    /// Wait out the backoff for `attempt` in poll-tick slices. Returns
    /// `false` when a stop or pause signal cut the wait short.
    async fn backoff_wait(&self, attempt: u32, controls: &mut Controls) -> bool {
        let mut remaining = self.backoff_delay(attempt);
        while remaining > Duration::ZERO {
            if controls.is_stopped() || controls.is_paused() {
                return false;
            }
            let tick = remaining.min(self.poll_tick);
            if !controls.interruptible_sleep(tick).await {
                // Woken by a signal change; loop re-checks which one.
                continue;
            }
            remaining = remaining.saturating_sub(tick);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::control::ControlHandle;

    use super::*;

    struct FailNThenSucceed {
        failures: u32,
        calls: AtomicU32,
        prompts: Mutex<Vec<String>>,
        error: fn() -> LlmError,
    }

    impl FailNThenSucceed {
        fn new(failures: u32, error: fn() -> LlmError) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                prompts: Mutex::new(Vec::new()),
                error,
            }
        }
    }

    #[async_trait]
    impl TextGenerator for FailNThenSucceed {
        async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err((self.error)())
            } else {
                Ok("generated story text".to_string())
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            poll_tick: Duration::from_millis(1),
            step_cooldown: Duration::from_millis(1),
        })
    }

    fn params() -> GenerationParams {
        GenerationParams {
            model: "test-model".to_string(),
            temperature: 0.8,
            top_p: 0.9,
            max_tokens: 4000,
        }
    }

    #[test]
    fn backoff_grows_then_plateaus() {
        let policy = fast_policy(50);
        for attempt in 0..BACKOFF_CAP_ATTEMPT {
            assert!(
                policy.backoff_delay(attempt) < policy.backoff_delay(attempt + 1),
                "backoff must grow through attempt {attempt}"
            );
        }
        assert_eq!(
            policy.backoff_delay(BACKOFF_CAP_ATTEMPT),
            policy.backoff_delay(BACKOFF_CAP_ATTEMPT + 15)
        );
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let generator = FailNThenSucceed::new(3, || LlmError::Transport("reset".to_string()));
        let policy = fast_policy(50);
        let handle = ControlHandle::new();
        let mut controls = handle.controls();

        let outcome = policy
            .run(&generator, "continue the story", &params(), "en", &mut controls)
            .await;
        match outcome {
            RetryOutcome::Success(text) => assert_eq!(text, "generated story text"),
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(generator.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let generator = FailNThenSucceed::new(u32::MAX, || LlmError::Server { status: 503 });
        let policy = fast_policy(3);
        let handle = ControlHandle::new();
        let mut controls = handle.controls();

        let outcome = policy
            .run(&generator, "continue", &params(), "en", &mut controls)
            .await;
        match outcome {
            RetryOutcome::Exhausted(LlmError::Server { status }) => assert_eq!(status, 503),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn too_short_strengthens_the_next_prompt() {
        let generator = FailNThenSucceed::new(1, || LlmError::TooShort { len: 12 });
        let policy = fast_policy(50);
        let handle = ControlHandle::new();
        let mut controls = handle.controls();

        let outcome = policy
            .run(&generator, "continue the story", &params(), "en", &mut controls)
            .await;
        assert!(matches!(outcome, RetryOutcome::Success(_)));

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts[0], "continue the story");
        assert!(prompts[1].contains("far too short"));
        assert!(prompts[1].contains("continue the story"));
    }

    #[tokio::test]
    async fn refusal_reframes_the_next_prompt() {
        let generator = FailNThenSucceed::new(1, || LlmError::Refusal);
        let policy = fast_policy(50);
        let handle = ControlHandle::new();
        let mut controls = handle.controls();

        let outcome = policy
            .run(&generator, "continue the story", &params(), "en", &mut controls)
            .await;
        assert!(matches!(outcome, RetryOutcome::Success(_)));

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[1].contains("routine fiction-writing task"));
    }

    #[tokio::test]
    async fn observer_fires_on_every_failed_attempt() {
        let generator = FailNThenSucceed::new(2, || LlmError::Transport("x".to_string()));
        let observed = Arc::new(AtomicU32::new(0));
        let counter = observed.clone();
        let policy = fast_policy(50).with_observer(Arc::new(move |_attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let handle = ControlHandle::new();
        let mut controls = handle.controls();

        policy
            .run(&generator, "continue", &params(), "en", &mut controls)
            .await;
        assert_eq!(observed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_interrupts_a_long_backoff_within_a_tick() {
        let generator = FailNThenSucceed::new(u32::MAX, || LlmError::Transport("x".to_string()));
        let policy = RetryPolicy::new(&RetryConfig {
            max_attempts: 50,
            base_delay: Duration::from_secs(60),
            poll_tick: Duration::from_millis(10),
            step_cooldown: Duration::from_millis(1),
        });
        let handle = ControlHandle::new();
        let mut controls = handle.controls();

        let runner = tokio::spawn(async move {
            policy
                .run(&generator, "continue", &params(), "en", &mut controls)
                .await
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop();

        let outcome = tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("stop must cut the backoff short")
            .unwrap();
        assert!(matches!(outcome, RetryOutcome::Interrupted));
    }

    #[tokio::test]
    async fn already_stopped_controls_short_circuit() {
        let generator = FailNThenSucceed::new(0, || LlmError::Refusal);
        let handle = ControlHandle::new();
        handle.stop();
        let mut controls = handle.controls();

        let outcome = fast_policy(50)
            .run(&generator, "continue", &params(), "en", &mut controls)
            .await;
        assert!(matches!(outcome, RetryOutcome::Interrupted));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }
}
