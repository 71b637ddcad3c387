//! End-to-end runs of the job pool against a scripted backend and a real
//! filesystem checkpoint store.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use novelforge::checkpoint::FsCheckpointStore;
use novelforge::config::{GenerationConfig, RetryConfig};
use novelforge::control::ControlHandle;
use novelforge::error::LlmError;
use novelforge::job::{GenerationLoop, JobPhase};
use novelforge::llm::retry::RetryPolicy;
use novelforge::llm::{GenerationParams, TextGenerator};
use novelforge::pool::JobPool;
use novelforge::summarize::Summarizer;

/// Paragraphs with deliberately low mutual overlap so the duplicate check
/// stays quiet during normal runs.
const CHUNKS: &[&str] = &[
    "Under the broken aqueduct, Sera counted the lanterns of the night market and missed one.",
    "A courier's horse stood riderless at the ford, saddlebags slit and papers gone to the current.",
    "The old astronomer charged nothing for bad news, which kept his tower busier than the temple.",
    "Winter reached the lowlands early that year, and with it came sellswords wearing no sigil at all.",
    "In the guildhall cellar, someone had scraped the tally marks from the oldest keg of records.",
    "She learned the tunnel's turns by smell: tar, then cold iron, then the green rot of the river gate.",
    "By law the bells could only ring for fire or coronation, so the third ringing meant somebody lied.",
    "The cartographer drew the marsh from memory and got every island right except the one that mattered.",
];

struct ScriptedBackend {
    calls: AtomicU32,
    delay: Duration,
}

impl ScriptedBackend {
    fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay,
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedBackend {
    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        Ok(CHUNKS[call % CHUNKS.len()].to_string())
    }
}

fn test_config(output_dir: &Path) -> (GenerationConfig, RetryConfig) {
    let generation = GenerationConfig {
        num_novels: 2,
        max_workers: 2,
        genre: "fantasy".to_string(),
        language: "en".to_string(),
        target_length: 300,
        create_ending: false,
        random_genres: false,
        batch_genres: Vec::new(),
        custom_prompt: None,
        summary_interval: 0,
        long_text_threshold: 250_000,
        step_similarity_threshold: 0.7,
        paragraph_similarity_threshold: 0.8,
        quality_check_interval: 5_000,
        dup_window: 10_000,
        output_dir: output_dir.to_path_buf(),
        continue_from_dir: None,
    };
    let retry = RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        poll_tick: Duration::from_millis(1),
        step_cooldown: Duration::from_millis(1),
    };
    (generation, retry)
}

fn build_pool(
    backend: Arc<dyn TextGenerator>,
    output_dir: &Path,
    mutate: impl FnOnce(&mut GenerationConfig),
) -> JobPool {
    let (mut generation, retry_cfg) = test_config(output_dir);
    mutate(&mut generation);

    let context_budget = 100_000;
    let retry = RetryPolicy::new(&retry_cfg);
    let params = GenerationParams {
        model: "test-model".to_string(),
        temperature: 0.8,
        top_p: 0.9,
        max_tokens: 4000,
    };
    let summarizer = Summarizer::new(
        backend.clone(),
        retry.clone(),
        params.clone(),
        context_budget,
        generation.long_text_threshold,
    );
    let store = Arc::new(FsCheckpointStore::new(output_dir));
    let runner = GenerationLoop::new(
        backend,
        store,
        retry,
        params,
        summarizer,
        generation.clone(),
        retry_cfg,
        context_budget,
        None,
    );
    JobPool::new(runner, ControlHandle::new(), generation)
}

#[tokio::test]
async fn batch_generates_to_target_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(Duration::ZERO));
    let pool = build_pool(backend, dir.path(), |_| {});

    let jobs = pool.build_fresh_jobs().unwrap();
    let outcomes = pool.run(jobs, dir.path()).await;

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert_eq!(outcome.phase, JobPhase::Completed);
        assert!(outcome.state.text.len() >= 300);
    }

    // Every job left a checkpoint pair behind, plus the batch summary.
    let checkpoints = FsCheckpointStore::discover(dir.path()).unwrap();
    assert_eq!(checkpoints.len(), 2);
    for path in &checkpoints {
        let loaded = FsCheckpointStore::load(path).await.unwrap();
        let matching = outcomes
            .iter()
            .find(|o| o.state.setup.id == loaded.setup.id)
            .expect("checkpoint for unknown job");
        assert_eq!(loaded.text, matching.state.text);
    }
    assert!(dir.path().join("summary.txt").exists());
}

#[tokio::test]
async fn continuation_resumes_and_extends() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(Duration::ZERO));

    let first_pool = build_pool(backend.clone(), dir.path(), |g| g.num_novels = 1);
    let first = first_pool
        .run(first_pool.build_fresh_jobs().unwrap(), dir.path())
        .await;
    let original_text = first[0].state.text.clone();
    assert_eq!(first[0].phase, JobPhase::Completed);

    // Resume from the same directory; the met target gets extended.
    let second_pool = build_pool(backend, dir.path(), |g| g.num_novels = 1);
    let resumed_jobs = second_pool.discover_jobs(dir.path()).await.unwrap();
    assert_eq!(resumed_jobs.len(), 1);
    assert_eq!(resumed_jobs[0].text, original_text);
    assert!(resumed_jobs[0].target_length > original_text.len());

    let second = second_pool.run(resumed_jobs, dir.path()).await;
    assert_eq!(second[0].phase, JobPhase::Completed);
    assert!(second[0].state.text.starts_with(&original_text));
    assert!(second[0].state.text.len() > original_text.len());
}

#[tokio::test]
async fn stop_leaves_resumable_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(Duration::from_millis(10)));
    let pool = build_pool(backend, dir.path(), |g| {
        g.num_novels = 1;
        g.target_length = 1_000_000;
    });

    let jobs = pool.build_fresh_jobs().unwrap();
    let handle = pool.handle().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop();
    });

    let outcomes = tokio::time::timeout(Duration::from_secs(10), pool.run(jobs, dir.path()))
        .await
        .expect("stop must end the run promptly");

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].phase, JobPhase::Stopped);

    let checkpoints = FsCheckpointStore::discover(dir.path()).unwrap();
    assert_eq!(checkpoints.len(), 1);
    let loaded = FsCheckpointStore::load(&checkpoints[0]).await.unwrap();
    assert_eq!(loaded.text, outcomes[0].state.text);
}
