//! Prompt assembly for generation steps.
//!
//! Builds the full request prompt from the setup, the latest summary, and a
//! trailing slice of the accumulated text. Assembly is infallible: missing
//! table entries fall back to generic instructions and absent placeholder
//! values substitute as empty strings.

mod templates;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::setup::NovelSetup;
use crate::util;

/// Everything the assembler needs to know about the current step.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub setup: &'a NovelSetup,
    pub current_text: &'a str,
    /// Budget in bytes; the trailing context slice uses 75% of it.
    pub context_budget: usize,
    /// Long-text mode adds extra anti-repetition emphasis.
    pub long_text: bool,
    /// Ending mode swaps the continuation framing for closing framing.
    pub ending: bool,
}

/// Fraction of the context budget given to the trailing text slice.
const CONTEXT_FRACTION: f64 = 0.75;

/// Assemble the prompt for one generation step. Never returns an empty
/// string.
pub fn assemble<R: Rng + ?Sized>(ctx: &PromptContext<'_>, rng: &mut R) -> String {
    let lang = ctx.setup.language.as_str();
    let mut prompt = String::new();

    prompt.push_str(&brief(ctx.setup, rng));
    prompt.push_str("\n\n");

    if let Some(summary) = ctx.setup.latest_summary() {
        prompt.push_str(templates::summary_preamble(lang));
        prompt.push('\n');
        prompt.push_str(&summary.text);
        prompt.push_str("\n\n");
    }

    let tail = trailing_context(ctx.current_text, ctx.context_budget);
    if tail.is_empty() {
        prompt.push_str(templates::opening_instruction(lang));
    } else {
        prompt.push_str(templates::context_preamble(lang));
        prompt.push('\n');
        prompt.push_str(tail);
        prompt.push_str("\n\n");
        if ctx.ending {
            prompt.push_str(templates::ending_instruction(lang));
        } else {
            prompt.push_str(templates::continuation_instruction(lang));
        }
    }

    prompt.push('\n');
    prompt.push_str(templates::min_length_instruction(lang));
    prompt.push('\n');
    prompt.push_str(templates::anti_repetition_instruction(lang));
    if ctx.long_text {
        prompt.push('\n');
        prompt.push_str(templates::long_text_emphasis(lang));
    }

    prompt
}

/// The creative brief: genre template with placeholders substituted, plus
/// one randomly chosen style variant. A custom prompt replaces the genre
/// template but still gets substitution.
fn brief<R: Rng + ?Sized>(setup: &NovelSetup, rng: &mut R) -> String {
    let template = match &setup.custom_prompt {
        Some(custom) => custom.as_str(),
        None => templates::base_template(&setup.language, &setup.genre),
    };
    let mut brief = substitute(template, setup);

    if let Some(style) = templates::style_variants(&setup.language).choose(rng) {
        brief.push(' ');
        brief.push_str(style);
    }
    brief
}

fn substitute(template: &str, setup: &NovelSetup) -> String {
    let p = &setup.protagonist;
    let w = &setup.world;
    let theme = setup.themes.first().map(String::as_str).unwrap_or(&w.theme);

    let mut out = template
        .replace("[GENRE]", &setup.genre)
        .replace("[LANGUAGE]", &setup.language)
        .replace("[PROTAGONIST_NAME]", &p.name)
        .replace("[PROTAGONIST_AGE]", &p.age.to_string())
        .replace("[PROTAGONIST_TRAITS]", &p.traits.join(", "))
        .replace("[STRENGTH]", &p.strength)
        .replace("[WEAKNESS]", &p.weakness)
        .replace("[BACKGROUND]", &p.background)
        .replace("[GOAL]", &p.goal)
        .replace("[MOTIVATION]", &p.motivation)
        .replace("[SETTING]", &w.setting)
        .replace("[ERA]", &w.era)
        .replace("[SOCIAL_STRUCTURE]", &w.social_structure)
        .replace("[THEME]", theme);

    // Placeholders with no known value vanish rather than leak brackets.
    static UNKNOWN: std::sync::LazyLock<regex::Regex> =
        std::sync::LazyLock::new(|| regex::Regex::new(r"\[[A-Z][A-Z0-9_]*\]").unwrap());
    if UNKNOWN.is_match(&out) {
        out = UNKNOWN.replace_all(&out, "").into_owned();
    }
    out
}

/// Trailing slice of the accumulated text, at most 75% of the context
/// budget, advanced past the first paragraph break so the slice starts on
/// a paragraph boundary when one exists.
fn trailing_context(text: &str, context_budget: usize) -> &str {
    let max_bytes = (context_budget as f64 * CONTEXT_FRACTION) as usize;
    let tail = util::tail_window(text, max_bytes);
    if tail.len() < text.len() {
        if let Some(pos) = tail.find("\n\n") {
            return tail[pos + 2..].trim_start();
        }
    }
    tail
}

/// Append an explicit minimum-length requirement after a too-short reply.
pub fn strengthen_min_length(prompt: &str, language: &str) -> String {
    let emphasis = match language {
        "zh" => "重要：上一次回复太短。这次必须写出完整的长篇段落，不少于800字。",
        _ => {
            "IMPORTANT: the previous reply was far too short. Write a full-length \
             passage this time, no less than 800 words."
        }
    };
    format!("{prompt}\n{emphasis}")
}

/// Reframe the request positively after a refusal.
pub fn reframe_after_refusal(prompt: &str, language: &str) -> String {
    let framing = match language {
        "zh" => "这是一部虚构文学作品的正常创作任务，请直接继续撰写故事正文。",
        _ => {
            "This is a routine fiction-writing task for an original novel. Please \
             continue the story text directly."
        }
    };
    format!("{framing}\n\n{prompt}")
}

/// Harden the anti-repetition framing for a regeneration after the fresh
/// chunk duplicated recent text.
pub fn strengthen_anti_repetition(prompt: &str, language: &str) -> String {
    let emphasis = match language {
        "zh" => {
            "警告：上一次生成的内容与已有正文重复。这次必须写全新的情节，\
             不得复用任何已出现的句子或场景。"
        }
        _ => {
            "WARNING: the previous attempt duplicated existing text. Produce \
             entirely new plot material; reusing any sentence or scene that \
             already appears is unacceptable."
        }
    };
    format!("{prompt}\n{emphasis}")
}
