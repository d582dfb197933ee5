//! Post-processing: strip language-model artefacts from a refined chunk.
//!
//! Even under a strict format-only instruction, models decorate their
//! output: a "Here are the notes:" opener, `-----` dividers, `****` rules,
//! a ```` ```markdown ```` wrapper. None of it is note content. This module
//! removes those artefacts with cheap deterministic rules and leaves
//! everything else (including legitimate `**bold**` and `~~strike~~`
//! pairs) untouched.
//!
//! ## Rule Order
//!
//! Fences come off first so the preamble check sees the real first line;
//! line endings are normalised before any line-anchored rule runs.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Apply all cleanup rules to one raw completion.
///
/// Rules (applied in order):
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF/CR → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Remove a conversational preamble line at the very start
/// 5. Remove divider lines of 3+ hyphens or underscores
/// 6. Remove decorative `*`/`~` runs (never paired emphasis delimiters)
/// 7. Trim surrounding whitespace
///
/// Pure and idempotent on text that carries none of the targeted artefacts.
pub fn clean_completion(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = strip_preamble(&s);
    let s = remove_divider_lines(&s);
    let s = remove_decorative_marker_runs(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Conversational preamble ─────────────────────────────────────────
//
// Only a whole opening line is removed, and only at the very start: a
// "Summary:" heading further down is content.

static RE_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\A[ \t]*(?:here are the notes:|summary:|let me help you[^\n]*)[ \t]*\n+")
        .unwrap()
});

fn strip_preamble(input: &str) -> String {
    RE_PREAMBLE.replace(input, "").into_owned()
}

// ── Rule 5: Divider lines ───────────────────────────────────────────────────
//
// Whole lines only. Table separator rows (`| --- |`) contain pipes and are
// never matched.

static RE_DIVIDER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:-{3,}|_{3,})[ \t]*(?:\n|\z)").unwrap());

fn remove_divider_lines(input: &str) -> String {
    RE_DIVIDER_LINE.replace_all(input, "").into_owned()
}

// ── Rule 6: Decorative emphasis-marker runs ─────────────────────────────────
//
// A run of 2+ identical `*` or `~` is decoration when it is 4+ long (no
// Markdown emphasis uses that many) or when it touches no text on either
// side. `**bold**`, `***both***` and `~~strike~~` keep their delimiters.

static RE_MARKER_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*{2,}|~{2,}").unwrap());

fn remove_decorative_marker_runs(input: &str) -> String {
    let mut current = input.to_string();
    // Removing one run can join its neighbours into a new one.
    loop {
        let next = remove_marker_runs_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn remove_marker_runs_once(input: &str) -> String {
    RE_MARKER_RUN
        .replace_all(input, |caps: &Captures<'_>| {
            let Some(m) = caps.get(0) else {
                return String::new();
            };
            let before = input[..m.start()].chars().next_back();
            let after = input[m.end()..].chars().next();
            let detached = |c: Option<char>| c.is_none_or(char::is_whitespace);
            let decorative = m.as_str().len() >= 4 || (detached(before) && detached(after));
            if decorative {
                String::new()
            } else {
                m.as_str().to_string()
            }
        })
        .into_owned()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_markdown_fences("```markdown\n# Hi\nyo\n```"), "# Hi\nyo");
        assert_eq!(strip_markdown_fences("```\n# Hi\n```"), "# Hi");
        assert_eq!(strip_markdown_fences("# Hi"), "# Hi");
    }

    #[test]
    fn test_preamble_removed_only_at_start() {
        assert_eq!(strip_preamble("Here are the notes:\n\n## Topic"), "## Topic");
        assert_eq!(strip_preamble("SUMMARY:\nText"), "Text");
        assert_eq!(
            strip_preamble("Let me help you format these notes.\n\nBody"),
            "Body"
        );
        let mid = "Intro\n\nSummary:\nkept";
        assert_eq!(strip_preamble(mid), mid);
    }

    #[test]
    fn test_preamble_must_be_whole_line() {
        let text = "Summary: offer plus acceptance\nmore";
        assert_eq!(strip_preamble(text), text);
    }

    #[test]
    fn test_divider_lines_removed() {
        assert_eq!(remove_divider_lines("a\n---\nb"), "a\nb");
        assert_eq!(remove_divider_lines("a\n  ______  \nb"), "a\nb");
        assert_eq!(remove_divider_lines("a\n-----"), "a\n");
    }

    #[test]
    fn test_table_separator_rows_survive() {
        let table = "| A | B |\n| --- | --- |\n| 1 | 2 |";
        assert_eq!(remove_divider_lines(table), table);
    }

    #[test]
    fn test_inline_hyphens_survive() {
        let text = "well-known pre--existing x---y";
        assert_eq!(remove_divider_lines(text), text);
    }

    #[test]
    fn test_emphasis_pairs_survive() {
        let text = "A **Contract** needs ~~two~~ ***three*** parts";
        assert_eq!(remove_decorative_marker_runs(text), text);
    }

    #[test]
    fn test_decorative_runs_removed() {
        assert_eq!(remove_decorative_marker_runs("****"), "");
        assert_eq!(remove_decorative_marker_runs("***"), "");
        assert_eq!(remove_decorative_marker_runs("end ~~~~~~"), "end ");
        assert_eq!(remove_decorative_marker_runs("a ** b"), "a  b");
        assert_eq!(remove_decorative_marker_runs("x****y"), "xy");
    }

    #[test]
    fn test_single_markers_untouched() {
        let text = "* item\n*italic* and ~approx~";
        assert_eq!(remove_decorative_marker_runs(text), text);
    }

    #[test]
    fn test_clean_completion_full_pipeline() {
        let raw = "```markdown\nHere are the notes:\n\n## Contract\r\n\r\n-----\r\nAn **offer** is made.\n\n********\n\n1. Example\n```";
        assert_eq!(
            clean_completion(raw),
            "## Contract\n\nAn **offer** is made.\n\n\n\n1. Example"
        );
    }

    #[test]
    fn test_clean_is_idempotent_on_clean_text() {
        let clean = "## Law of Contract\n\n**Offer**: a promise.\n\n- _Carlill v. Carbolic_\n> example\n\n| a | b |\n| --- | --- |";
        let once = clean_completion(clean);
        assert_eq!(once, clean);
        assert_eq!(clean_completion(&once), once);
    }

    #[test]
    fn test_clean_echo_only_trims() {
        assert_eq!(clean_completion("Hello\n\nWorld\n"), "Hello\n\nWorld");
    }
}
