//! Paragraph-aware merge of a new chunk into accumulated text.

/// Join `new` onto `existing` without run-on paragraphs or blank-line pileup.
///
/// The existing text always keeps exactly one trailing newline before the
/// chunk. A blank line (paragraph break) is inserted only when the chunk
/// does not open with a quote character and does not start with an
/// uppercase letter; quoted dialogue and capitalized sentence starts
/// continue the current paragraph on the next line.
pub fn merge(existing: &str, new: &str) -> String {
    if existing.is_empty() {
        return new.to_string();
    }
    if new.is_empty() {
        return existing.to_string();
    }

    let existing = existing.trim_end();
    let new = new.trim_start();
    if new.is_empty() {
        return existing.to_string();
    }

    let mut out = String::with_capacity(existing.len() + new.len() + 2);
    out.push_str(existing);
    out.push('\n');

    let first = match new.chars().next() {
        Some(c) => c,
        None => return out,
    };
    let opens_quote = matches!(first, '"' | '\u{201c}' | '\u{300c}' | '\u{300e}');
    if !opens_quote && !first.is_uppercase() {
        out.push('\n');
    }
    out.push_str(new);
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_existing_returns_chunk_unchanged() {
        assert_eq!(merge("", "Hello world."), "Hello world.");
    }

    #[test]
    fn empty_chunk_returns_existing_unchanged() {
        assert_eq!(merge("Hello world.", ""), "Hello world.");
    }

    #[test]
    fn quote_start_gets_newline_but_no_paragraph_break() {
        let merged = merge("He stopped at the door", "\"Who's there?\" she asked.");
        assert_eq!(merged, "He stopped at the door\n\"Who's there?\" she asked.");
    }

    #[test]
    fn uppercase_start_continues_paragraph() {
        let merged = merge("The rain fell all night.\n", "Morning came gray and cold.");
        assert_eq!(merged, "The rain fell all night.\nMorning came gray and cold.");
    }

    #[test]
    fn lowercase_start_gets_paragraph_break() {
        let merged = merge("The rain fell all night.", "morning came gray and cold.");
        assert_eq!(merged, "The rain fell all night.\n\nmorning came gray and cold.");
    }

    #[test]
    fn cjk_start_gets_paragraph_break() {
        let merged = merge("第一段结束。", "第二段开始了。");
        assert_eq!(merged, "第一段结束。\n\n第二段开始了。");
    }

    #[test]
    fn existing_text_is_preserved_as_prefix() {
        let cases = [
            ("Some text", "And more."),
            ("Some text\n\n\n", "\"quoted\""),
            ("Trailing spaces   ", "lowercase start"),
        ];
        for (existing, new) in cases {
            let merged = merge(existing, new);
            assert!(
                merged.starts_with(existing.trim_end()),
                "{merged:?} does not start with {existing:?}"
            );
        }
    }

    #[test]
    fn no_blank_line_accumulation_across_merges() {
        let mut text = String::from("Chapter one begins here.");
        for _ in 0..4 {
            text = merge(&text, "and the story went on quietly.");
        }
        assert!(!text.contains("\n\n\n"));
    }
}
