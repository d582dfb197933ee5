//! Rule-based note formatting: a no-model alternative to refinement.
//!
//! Works line by line on raw OCR text. Every line is kept; rules only add
//! Markdown structure around recognisable lecture-note patterns:
//!
//! | Pattern                         | Output                    |
//! |---------------------------------|---------------------------|
//! | line starting `Lesson`/`Chapter` | `## **<line>**`          |
//! | `3)` or `3.` list marker         | `3. `                     |
//! | `-`, `•` or `*` bullet           | `- `                      |
//! | `eg`, `e.g.`, `example`          | `**Example:**`            |
//! | `Carlill v. Carbolic`            | `**Carlill v. Carbolic**` |

use once_cell::sync::Lazy;
use regex::Regex;

static RE_TOPIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:lesson|chapter)\b").unwrap());

static RE_NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)[.)]\s*").unwrap());

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-•*]\s+").unwrap());

static RE_EXAMPLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:eg\b|e\.g\.|example\b)[:,]?").unwrap());

static RE_CASE_CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z][a-z]+ v\. [A-Z][a-z]+)").unwrap());

/// Format raw notes with the line rules above. Lines are trimmed and
/// joined with `\n`.
pub fn format_notes(raw: &str) -> String {
    raw.lines().map(format_line).collect::<Vec<_>>().join("\n")
}

fn format_line(line: &str) -> String {
    let line = line.trim();
    if RE_TOPIC.is_match(line) {
        return format!("## **{}**", line);
    }
    let line = RE_NUMBERED.replace(line, "$1. ");
    let line = RE_BULLET.replace(&line, "- ");
    let line = RE_EXAMPLE.replace_all(&line, "**Example:**");
    RE_CASE_CITATION.replace_all(&line, "**$1**").into_owned()
}
