//! Static prompt text, keyed by language and genre.
//!
//! Lookups never fail; an unknown language falls back to English and an
//! unknown genre to the generic template. Placeholder names in square
//! brackets are substituted by the assembler.

pub(crate) fn base_template(language: &str, genre: &str) -> &'static str {
    match (language, genre) {
        ("zh", "fantasy") => {
            "请创作一部[GENRE]小说。主角是[PROTAGONIST_NAME]，[PROTAGONIST_AGE]岁，\
             性格[PROTAGONIST_TRAITS]。故事发生在[SETTING]，时代背景为[ERA]。\
             核心主题：[THEME]。主角的目标是[GOAL]，驱动力来自[MOTIVATION]。"
        }
        ("zh", _) => {
            "请创作一部[GENRE]小说。主角是[PROTAGONIST_NAME]，[PROTAGONIST_AGE]岁，\
             性格[PROTAGONIST_TRAITS]。故事发生在[SETTING]。核心主题：[THEME]。\
             主角的目标是[GOAL]。"
        }
        (_, "fantasy") => {
            "Write a [GENRE] novel. The protagonist is [PROTAGONIST_NAME], age \
             [PROTAGONIST_AGE], who is [PROTAGONIST_TRAITS]. The story unfolds in \
             [SETTING] during [ERA], where society is shaped by [SOCIAL_STRUCTURE]. \
             Central theme: [THEME]. [PROTAGONIST_NAME]'s goal is [GOAL], driven by \
             [MOTIVATION]. Let the magic and its costs stay concrete and consistent."
        }
        (_, "scifi") => {
            "Write a [GENRE] novel. The protagonist is [PROTAGONIST_NAME], age \
             [PROTAGONIST_AGE], who is [PROTAGONIST_TRAITS]. The story is set in \
             [SETTING] during [ERA]; society runs on [SOCIAL_STRUCTURE]. Central \
             theme: [THEME]. [PROTAGONIST_NAME]'s goal is [GOAL], driven by \
             [MOTIVATION]. Keep the technology grounded in consequences, not exposition."
        }
        (_, "mystery") => {
            "Write a [GENRE] novel. The protagonist is [PROTAGONIST_NAME], age \
             [PROTAGONIST_AGE], who is [PROTAGONIST_TRAITS]. The story takes place in \
             [SETTING] during [ERA]. Central theme: [THEME]. [PROTAGONIST_NAME]'s goal \
             is [GOAL], driven by [MOTIVATION]. Plant clues fairly; let the reader \
             almost solve it first."
        }
        (_, "horror") => {
            "Write a [GENRE] novel. The protagonist is [PROTAGONIST_NAME], age \
             [PROTAGONIST_AGE], who is [PROTAGONIST_TRAITS]. The story is set in \
             [SETTING] during [ERA]. Central theme: [THEME]. [PROTAGONIST_NAME]'s goal \
             is [GOAL], driven by [MOTIVATION]. Build dread through the ordinary; \
             show the wrongness before naming it."
        }
        _ => {
            "Write a [GENRE] novel. The protagonist is [PROTAGONIST_NAME], age \
             [PROTAGONIST_AGE], who is [PROTAGONIST_TRAITS]. The story is set in \
             [SETTING] during [ERA]. Central theme: [THEME]. [PROTAGONIST_NAME]'s goal \
             is [GOAL], driven by [MOTIVATION]."
        }
    }
}

pub(crate) fn style_variants(language: &str) -> &'static [&'static str] {
    match language {
        "zh" => &[
            "文风细腻，注重人物内心描写与环境氛围的交织。",
            "节奏明快，以对话和行动推进情节。",
            "叙述沉稳，善用留白，情感克制而有力。",
        ],
        _ => &[
            "Favor close third-person narration with vivid sensory detail.",
            "Keep the pacing brisk; let dialogue and action carry the scenes.",
            "Use a measured, literary voice; trust subtext over explanation.",
            "Alternate quiet character moments with sharp turns of event.",
        ],
    }
}

pub(crate) fn opening_instruction(language: &str) -> &'static str {
    match language {
        "zh" => "现在开始写这部小说的开头。直接进入故事场景，不要任何前言或说明。",
        _ => {
            "Begin the novel now. Open inside a concrete scene; no preamble, \
             no meta commentary, no chapter headings."
        }
    }
}

pub(crate) fn continuation_instruction(language: &str) -> &'static str {
    match language {
        "zh" => "从上文结尾处自然续写故事。不要重复已有内容，不要总结，直接继续叙述。",
        _ => {
            "Continue the story seamlessly from where the text above ends. Do not \
             recap, do not repeat earlier passages, do not summarize; pick up the \
             narrative mid-flow."
        }
    }
}

pub(crate) fn ending_instruction(language: &str) -> &'static str {
    match language {
        "zh" => {
            "现在为这部小说写结局。收束所有主要情节线，完成主角的人物弧光，\
             给出一个有分量的结尾。这是最后一段内容。"
        }
        _ => {
            "Now write the ending of the novel. Resolve every major plot line, \
             complete the protagonist's arc, and land a final scene with weight. \
             This is the last passage of the book."
        }
    }
}

pub(crate) fn min_length_instruction(language: &str) -> &'static str {
    match language {
        "zh" => "本段续写不少于800字，充分展开场景与细节。",
        _ => "Write at least 800 words in this passage; develop scenes fully rather than rushing."
    }
}

pub(crate) fn anti_repetition_instruction(language: &str) -> &'static str {
    match language {
        "zh" => "严禁重复之前出现过的段落、句式或场景，必须推进新的情节。",
        _ => {
            "Do not reuse sentences, phrasings, or scene beats that already appear \
             in the story. Every paragraph must advance the plot with new material."
        }
    }
}

pub(crate) fn long_text_emphasis(language: &str) -> &'static str {
    match language {
        "zh" => {
            "这是一部长篇作品，重复是最严重的问题：引入新的地点、人物或冲突，\
             避免任何似曾相识的段落。"
        }
        _ => {
            "This is a long work and repetition is the gravest flaw at this stage: \
             introduce new locations, characters, or conflicts, and avoid any \
             passage that reads like one that came before."
        }
    }
}

pub(crate) fn summary_preamble(language: &str) -> &'static str {
    match language {
        "zh" => "故事梗概（此前内容的总结）：",
        _ => "Story so far (summary of earlier chapters):",
    }
}

pub(crate) fn context_preamble(language: &str) -> &'static str {
    match language {
        "zh" => "最近的正文（从此处续写）：",
        _ => "Most recent text (continue from here):",
    }
}
