//! Sanitization of raw model output before it is merged into a document.
//!
//! Raw chunks arrive with continuation boilerplate ("Here is the
//! continuation: ..."), meta commentary, markdown headings, runaway
//! punctuation, and stretches of blank lines. The pipeline here strips all
//! of that and, once the accumulated document is large enough to be in
//! long-text mode, also runs paragraph dedup over the chunk.
//!
//! Every pass is infallible, so sanitization can never fail and never
//! panics on any input; it is also idempotent (each pass either removes a
//! construct entirely or maps it to its own fixed point).

use std::sync::LazyLock;

use regex::Regex;

use crate::text::dedup::{DedupOptions, dedup_paragraphs};

/// Tuning knobs for chunk sanitization.
#[derive(Debug, Clone)]
pub struct SanitizeOptions {
    /// Accumulated-document size beyond which paragraph dedup also runs.
    pub long_text_threshold: usize,
    pub dedup: DedupOptions,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            long_text_threshold: 250_000,
            dedup: DedupOptions::default(),
        }
    }
}

/// Boilerplate phrases stripped from the start of a chunk unconditionally.
const PHRASE_MARKERS: &[&str] = &[
    "here is the continuation of the story",
    "here is the continuation",
    "here's the continuation",
    "continuing the story",
    "the story continues",
    "以下是继续的内容",
    "以下是故事的继续",
    "接下来是续写内容",
    "下面继续创作",
    "故事继续",
    "接着写",
];

/// Short lead-ins stripped only when a colon follows, so that prose which
/// merely happens to open with the word survives.
const COLON_MARKERS: &[&str] = &["continuation", "continuing", "继续创作", "继续"];

/// A line containing any of these is a meta note; the line and everything
/// up to (and including) the next blank line are dropped.
const META_MARKERS: &[&str] = &[
    "note:",
    "explanation:",
    "```",
    "注意:",
    "说明:",
    "提示:",
    "继续写作:",
];

/// Transform one raw model chunk into text safe to append.
///
/// `document_len` is the size of the whole accumulated document the chunk
/// is destined for; it decides whether long-text dedup applies.
pub fn sanitize(chunk: &str, document_len: usize, opts: &SanitizeOptions) -> String {
    let stripped = strip_continuation_markers(chunk);
    let cleaned = line_pass(&stripped);

    let deduped = if document_len > opts.long_text_threshold {
        dedup_paragraphs(&cleaned, &opts.dedup)
    } else {
        cleaned
    };

    deduped.trim().to_string()
}

/// Byte length of `prefix` at the start of `s`, compared case-insensitively
/// per char. Returns `None` when `s` does not start with `prefix`.
fn ci_prefix_len(s: &str, prefix: &str) -> Option<usize> {
    let mut len = 0usize;
    let mut sc = s.chars();
    for pc in prefix.chars() {
        let c = sc.next()?;
        if !c.to_lowercase().eq(pc.to_lowercase()) {
            return None;
        }
        len += c.len_utf8();
    }
    Some(len)
}

fn strip_continuation_markers(chunk: &str) -> String {
    let mut rest = chunk.trim_start();

    loop {
        let mut advanced = false;

        for marker in PHRASE_MARKERS {
            if let Some(len) = ci_prefix_len(rest, marker) {
                rest = rest[len..].trim_start();
                advanced = true;
                break;
            }
        }

        if !advanced {
            for marker in COLON_MARKERS {
                if let Some(len) = ci_prefix_len(rest, marker) {
                    let after = rest[len..].trim_start();
                    if after.starts_with(':') || after.starts_with('：') {
                        rest = after;
                        advanced = true;
                        break;
                    }
                }
            }
        }

        // A colon left behind by a stripped marker.
        if let Some(stripped) = rest.strip_prefix(':').or_else(|| rest.strip_prefix('：')) {
            rest = stripped.trim_start();
            advanced = true;
        }

        if !advanced {
            return rest.to_string();
        }
    }
}

fn is_meta_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    META_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Line-oriented pass: meta-note skip spans, blank-line collapsing, heading
/// stripping, and per-line punctuation normalization. Preserves each line's
/// original newline style.
fn line_pass(chunk: &str) -> String {
    let mut out = String::with_capacity(chunk.len());
    let mut skip_mode = false;
    let mut consecutive_blanks = 0u32;

    for line in chunk.split_inclusive('\n') {
        let stripped = line.trim();

        if is_meta_line(stripped) {
            skip_mode = true;
            continue;
        }
        if skip_mode {
            // The blank line terminates the span and is dropped with it.
            if stripped.is_empty() {
                skip_mode = false;
            }
            continue;
        }

        if stripped.is_empty() {
            consecutive_blanks += 1;
            if consecutive_blanks <= 1 {
                out.push_str(line);
            }
            continue;
        }
        consecutive_blanks = 0;

        let ending = &line[line.trim_end_matches(['\r', '\n']).len()..];
        if stripped.starts_with('#') {
            out.push_str(stripped.trim_start_matches('#').trim_start());
        } else {
            out.push_str(&fix_punctuation(line.trim_end_matches(['\r', '\n'])));
        }
        out.push_str(ending);
    }

    out
}

static PUNCT_RUNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"。{4,}").unwrap(), "。。。"),
        (Regex::new(r"！{4,}").unwrap(), "！！！"),
        (Regex::new(r"？{4,}").unwrap(), "？？？"),
        (Regex::new(r"\.{4,}").unwrap(), "..."),
        (Regex::new(r"!{4,}").unwrap(), "!!!"),
        (Regex::new(r"\?{4,}").unwrap(), "???"),
        (Regex::new(r"…{2,}").unwrap(), "…"),
        // Contradictory adjacent pairs resolve to the stronger mark.
        (Regex::new(r"。，|，。").unwrap(), "。"),
        (Regex::new(r"！。|。！").unwrap(), "！"),
        (Regex::new(r"？。|。？").unwrap(), "？"),
        (Regex::new(r"\.,|,\.").unwrap(), "."),
        (Regex::new(r"“{2,}").unwrap(), "“"),
        (Regex::new(r"”{2,}").unwrap(), "”"),
        (Regex::new(r#""{2,}"#).unwrap(), "\""),
        (Regex::new(r"'{2,}").unwrap(), "'"),
    ]
});

/// Normalize punctuation in one line.
///
/// Rules are applied to a fixed point: collapsing a pair can surface a new
/// run (and vice versa), and a single left-to-right pass over either rule
/// set alone is not idempotent. The loop is bounded; each iteration only
/// ever shrinks the string.
fn fix_punctuation(line: &str) -> String {
    let mut current = line.to_string();
    for _ in 0..16 {
        let mut next = current.clone();
        for (re, replacement) in PUNCT_RUNS.iter() {
            next = re.replace_all(&next, *replacement).into_owned();
        }
        if next == current {
            break;
        }
        current = next;
    }
    current
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sanitize_short(chunk: &str) -> String {
        sanitize(chunk, 0, &SanitizeOptions::default())
    }

    #[test]
    fn strips_continuation_boilerplate() {
        assert_eq!(
            sanitize_short("Here is the continuation: The knight pressed on."),
            "The knight pressed on."
        );
        assert_eq!(sanitize_short("继续创作：夜色渐深。"), "夜色渐深。");
        assert_eq!(sanitize_short("：夜色渐深。"), "夜色渐深。");
    }

    #[test]
    fn marker_word_without_colon_survives() {
        let chunk = "Continuing her climb, she reached the ledge.";
        assert_eq!(sanitize_short(chunk), chunk);
    }

    #[test]
    fn meta_note_line_and_terminating_blank_dropped() {
        let chunk = "First paragraph.\nNote: this is commentary\nstill commentary\n\nSecond paragraph.";
        assert_eq!(sanitize_short(chunk), "First paragraph.\nSecond paragraph.");
    }

    #[test]
    fn code_fences_are_dropped() {
        let chunk = "Story text.\n```\nnot story\n```\n\nMore story.";
        assert_eq!(sanitize_short(chunk), "Story text.\nMore story.");
    }

    #[test]
    fn blank_runs_collapse_to_one() {
        let chunk = "Para one.\n\n\n\n\nPara two.";
        assert_eq!(sanitize_short(chunk), "Para one.\n\nPara two.");
    }

    #[test]
    fn heading_markers_stripped() {
        let chunk = "## Chapter Three\nThe door opened.";
        assert_eq!(sanitize_short(chunk), "Chapter Three\nThe door opened.");
    }

    #[test]
    fn punctuation_runs_collapse_to_three() {
        assert_eq!(sanitize_short("What?????"), "What???");
        assert_eq!(sanitize_short("No!!!!!!"), "No!!!");
        assert_eq!(sanitize_short("就这样。。。。。。"), "就这样。。。");
        assert_eq!(sanitize_short("Well......"), "Well...");
    }

    #[test]
    fn ellipsis_runs_collapse_to_one() {
        assert_eq!(sanitize_short("然后……………"), "然后…");
    }

    #[test]
    fn contradictory_pairs_resolve_to_stronger_mark() {
        assert_eq!(sanitize_short("走了。，然后"), "走了。然后");
        assert_eq!(sanitize_short("真的！。吗"), "真的！吗");
        assert_eq!(sanitize_short("end., next"), "end. next");
    }

    #[test]
    fn repeated_quotes_collapse() {
        assert_eq!(sanitize_short("\"\"Hello,\" he said."), "\"Hello,\" he said.");
    }

    #[test]
    fn long_text_mode_dedups_paragraphs() {
        let para = "The storm broke over the ridge just before midnight.";
        let chunk = format!("{para}\n\n{para}");
        let opts = SanitizeOptions::default();
        let out = sanitize(&chunk, opts.long_text_threshold + 1, &opts);
        assert_eq!(out, para);
        // Below the threshold the repeat is left for the step-level check.
        assert_eq!(sanitize(&chunk, 0, &opts), chunk);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "Here is the continuation: Note: meta\n\nReal text!!!!! And more.....\n\n\n\nEnd.",
            "# Heading\n\n\nBody。，text。。。。。",
            "Plain already-clean text.\n\nSecond paragraph.",
            "\"\"Doubled quotes\" and trailing   \n\n",
        ];
        let opts = SanitizeOptions::default();
        for input in inputs {
            let once = sanitize(input, 0, &opts);
            let twice = sanitize(&once, 0, &opts);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn idempotent_in_long_text_mode() {
        let opts = SanitizeOptions::default();
        let doc_len = opts.long_text_threshold + 1;
        let input = "Alpha paragraph with content.\n\nAlpha paragraph with content.\n\nBeta paragraph differs.";
        let once = sanitize(input, doc_len, &opts);
        assert_eq!(once, sanitize(&once, doc_len, &opts));
    }

    #[test]
    fn outer_whitespace_trimmed_interior_breaks_kept() {
        let chunk = "  \nPara one.\n\nPara two.\n   ";
        assert_eq!(sanitize_short(chunk), "Para one.\n\nPara two.");
    }

    #[test]
    fn garbage_input_passes_through_unharmed() {
        // No input can make sanitization fail; worst case it returns
        // something trimmed.
        let weird = "\u{0}\u{fffd}\n\n\n###\n!!??。。";
        let _ = sanitize_short(weird);
    }
}
