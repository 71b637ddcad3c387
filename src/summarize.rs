//! Tiered summarization of the accumulated text.
//!
//! Short texts are summarized in half-context segments whose summaries are
//! synthesized into one. Past the long-text threshold the text is instead
//! sampled structurally: a beginning slice, several evenly spaced middle
//! slices, and an ending slice, each summarized with region-appropriate
//! instructions before synthesis. Synthesis failure always falls back to
//! the concatenated partial summaries, so summarization degrades rather
//! than fails.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::control::Controls;
use crate::error::JobError;
use crate::llm::retry::{RetryOutcome, RetryPolicy};
use crate::llm::{GenerationParams, TextGenerator};
use crate::setup::{NovelSetup, Summary};
use crate::util;

/// Upper bound on any single slice handed to the backend, in bytes.
const MAX_SLICE: usize = 50_000;
/// Middle slices below this size carry too little signal to summarize.
const MIN_SLICE: usize = 1_000;
/// One middle slice per this many bytes of text, clamped to 3..=8.
const BYTES_PER_MIDDLE_SLICE: usize = 100_000;

#[derive(Debug, Clone, Copy)]
enum Region {
    Beginning,
    Middle,
    Ending,
    Whole,
}

pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    params: GenerationParams,
    context_budget: usize,
    long_text_threshold: usize,
}

impl Summarizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        retry: RetryPolicy,
        params: GenerationParams,
        context_budget: usize,
        long_text_threshold: usize,
    ) -> Self {
        Self {
            generator,
            retry,
            params,
            context_budget,
            long_text_threshold,
        }
    }

    /// Summarize `text` into one [`Summary`] record.
    ///
    /// Only a stop/pause interruption is an error; every backend failure
    /// degrades to a cruder summary instead.
    pub async fn summarize(
        &self,
        text: &str,
        setup: &NovelSetup,
        controls: &mut Controls,
    ) -> Result<Summary, JobError> {
        let body = if text.len() > self.long_text_threshold {
            self.summarize_long(text, setup, controls).await?
        } else {
            self.summarize_segmented(text, setup, controls).await?
        };

        info!(
            genre = %setup.genre,
            source_chars = text.len(),
            summary_chars = body.len(),
            "summary produced"
        );
        Ok(Summary {
            length_at_creation: text.len(),
            timestamp: Utc::now(),
            text: body,
            genre: setup.genre.clone(),
            language: setup.language.clone(),
        })
    }

    /// Normal path: consecutive half-context segments, then synthesis.
    async fn summarize_segmented(
        &self,
        text: &str,
        setup: &NovelSetup,
        controls: &mut Controls,
    ) -> Result<String, JobError> {
        let segment_size = (self.context_budget / 2).max(MIN_SLICE);
        let mut partials = Vec::new();

        let mut start = 0;
        while start < text.len() {
            let end = util::floor_char_boundary(text, (start + segment_size).min(text.len()));
            let end = if end <= start { text.len() } else { end };
            let segment = &text[start..end];
            if let Some(partial) = self
                .summarize_slice(segment, Region::Whole, setup, controls)
                .await?
            {
                partials.push(partial);
            }
            start = end;
        }

        self.synthesize(partials, text, setup, controls).await
    }

    /// Long-text path: beginning, evenly spaced middle slices, and ending.
    async fn summarize_long(
        &self,
        text: &str,
        setup: &NovelSetup,
        controls: &mut Controls,
    ) -> Result<String, JobError> {
        let len = text.len();
        let beginning_len = MAX_SLICE.min(len / 10);
        let ending_len = MAX_SLICE.min(len.saturating_sub(beginning_len));
        let middle_len = len.saturating_sub(beginning_len + ending_len);
        let num_middle = (len / BYTES_PER_MIDDLE_SLICE).clamp(3, 8);
        let slice_len = MAX_SLICE.min(middle_len / num_middle.max(1));

        let mut partials = Vec::new();

        let beginning = &text[..util::floor_char_boundary(text, beginning_len)];
        if let Some(partial) = self
            .summarize_slice(beginning, Region::Beginning, setup, controls)
            .await?
        {
            partials.push(format!("[Beginning] {partial}"));
        }

        if slice_len >= MIN_SLICE {
            let stride = middle_len / num_middle;
            for i in 0..num_middle {
                let start =
                    util::ceil_char_boundary(text, beginning_len + i * stride);
                let end = util::floor_char_boundary(text, (start + slice_len).min(len));
                if end <= start {
                    continue;
                }
                if let Some(partial) = self
                    .summarize_slice(&text[start..end], Region::Middle, setup, controls)
                    .await?
                {
                    partials.push(format!("[Middle {}] {partial}", i + 1));
                }
            }
        }

        let ending = util::tail_window(text, ending_len);
        if let Some(partial) = self
            .summarize_slice(ending, Region::Ending, setup, controls)
            .await?
        {
            partials.push(format!("[Ending] {partial}"));
        }

        self.synthesize(partials, text, setup, controls).await
    }

    /// Summarize one slice. `Ok(None)` means the backend never produced a
    /// usable reply and the slice is skipped.
    async fn summarize_slice(
        &self,
        slice: &str,
        region: Region,
        setup: &NovelSetup,
        controls: &mut Controls,
    ) -> Result<Option<String>, JobError> {
        let prompt = format!(
            "{}\n\n{}",
            region_instruction(region, &setup.language),
            slice
        );
        self.call(&prompt, &setup.language, controls).await
    }

    /// Fold the partial summaries into one. Falls back to the labeled
    /// concatenation when synthesis fails, and to a raw tail excerpt when
    /// nothing at all was summarized.
    async fn synthesize(
        &self,
        partials: Vec<String>,
        text: &str,
        setup: &NovelSetup,
        controls: &mut Controls,
    ) -> Result<String, JobError> {
        match partials.len() {
            0 => {
                warn!("no slice produced a summary; falling back to raw excerpt");
                Ok(util::tail_window(text, 2_000).to_string())
            }
            1 => Ok(partials.into_iter().next().unwrap_or_default()),
            _ => {
                let concatenated = partials.join("\n\n");
                let prompt = format!(
                    "{}\n\n{}",
                    synthesis_instruction(&setup.language),
                    concatenated
                );
                match self.call(&prompt, &setup.language, controls).await? {
                    Some(synthesized) => Ok(synthesized),
                    None => {
                        warn!("synthesis failed; using concatenated partial summaries");
                        Ok(concatenated)
                    }
                }
            }
        }
    }

    async fn call(
        &self,
        prompt: &str,
        language: &str,
        controls: &mut Controls,
    ) -> Result<Option<String>, JobError> {
        match self
            .retry
            .run(self.generator.as_ref(), prompt, &self.params, language, controls)
            .await
        {
            RetryOutcome::Success(text) => Ok(Some(text.trim().to_string())),
            RetryOutcome::Interrupted => Err(JobError::Interrupted),
            RetryOutcome::Exhausted(error) => {
                warn!(%error, "summarization call exhausted its retries");
                Ok(None)
            }
        }
    }
}

fn region_instruction(region: Region, language: &str) -> &'static str {
    match (language, region) {
        ("zh", Region::Beginning) => "总结以下小说开头部分的人物设定、世界背景与初始冲突：",
        ("zh", Region::Middle) => "总结以下小说中段的情节推进与人物关系变化：",
        ("zh", Region::Ending) => "总结以下小说近期内容的高潮与当前局势：",
        ("zh", Region::Whole) => "用简洁的篇幅总结以下小说内容的关键情节与人物：",
        (_, Region::Beginning) => {
            "Summarize this opening section of a novel: the characters introduced, \
             the world, and the initial conflict:"
        }
        (_, Region::Middle) => {
            "Summarize this middle section of a novel: how the plot advances and \
             how the character relationships shift:"
        }
        (_, Region::Ending) => {
            "Summarize this recent section of a novel: the current climax and \
             where things stand now:"
        }
        (_, Region::Whole) => {
            "Summarize the key plot points and characters of this novel excerpt \
             concisely:"
        }
    }
}

fn synthesis_instruction(language: &str) -> &'static str {
    match language {
        "zh" => "将以下分段摘要合并为一份连贯的完整故事梗概，保留所有关键情节：",
        _ => {
            "Combine the following section summaries into one coherent synopsis of \
             the whole story so far, keeping every key plot point:"
        }
    }
}
