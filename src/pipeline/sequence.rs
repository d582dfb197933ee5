//! Natural ("human") filename ordering.
//!
//! Phones and scanners name pages `IMG_2.jpg`, `IMG_10.jpg`, … and a plain
//! string sort puts page 10 before page 2. [`natural_key`] splits a name
//! into alternating text / digit runs so digit runs compare by value and
//! text runs compare case-insensitively.
//!
//! Every key starts with a text run (possibly empty) and strictly
//! alternates, so two keys only ever compare text with text and numbers
//! with numbers at the same position.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// One run of a [`NaturalKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPart {
    /// Non-digit run, lowercased.
    Text(String),
    /// Digit run with leading zeros removed (`"0"` for all-zero runs).
    ///
    /// Stored as digits rather than an integer so arbitrarily long runs
    /// never overflow.
    Number(String),
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Text(a), KeyPart::Text(b)) => a.cmp(b),
            (KeyPart::Number(a), KeyPart::Number(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            // Unreachable for keys built by `natural_key`; fixed for totality.
            (KeyPart::Number(_), KeyPart::Text(_)) => Ordering::Less,
            (KeyPart::Text(_), KeyPart::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Comparison key for natural filename ordering.
pub type NaturalKey = Vec<KeyPart>;

/// Build the natural sort key for a filename.
///
/// `"img10.png"` → `[Text("img"), Number("10"), Text(".png")]`,
/// `"2.jpg"` → `[Text(""), Number("2"), Text(".jpg")]`.
pub fn natural_key(name: &str) -> NaturalKey {
    let mut parts = Vec::new();
    let mut run = String::new();
    let mut in_digits = false;

    for ch in name.chars() {
        let is_digit = ch.is_ascii_digit();
        if is_digit != in_digits {
            parts.push(close_run(&run, in_digits));
            run.clear();
            in_digits = is_digit;
        }
        run.push(ch);
    }
    parts.push(close_run(&run, in_digits));
    // A trailing digit run is followed by an empty text run, keeping the
    // text/number alternation aligned between keys.
    if in_digits {
        parts.push(KeyPart::Text(String::new()));
    }
    parts
}

fn close_run(run: &str, digits: bool) -> KeyPart {
    if digits {
        let trimmed = run.trim_start_matches('0');
        KeyPart::Number(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
    } else {
        KeyPart::Text(run.to_lowercase())
    }
}

/// A discovered image: its path and its precomputed natural sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    path: PathBuf,
    file_name: String,
    key: NaturalKey,
}

impl ImageHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = natural_key(&file_name);
        Self {
            path,
            file_name,
            key,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn key(&self) -> &NaturalKey {
        &self.key
    }
}

/// Sort handles by natural key.
///
/// Names with equal keys (`01.png` / `1.png`) fall back to the raw file
/// name so the order never depends on directory iteration order.
pub fn sort_naturally(handles: &mut [ImageHandle]) {
    handles.sort_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(names: &[&str]) -> Vec<String> {
        let mut handles: Vec<ImageHandle> = names.iter().map(|n| ImageHandle::new(*n)).collect();
        sort_naturally(&mut handles);
        handles.iter().map(|h| h.file_name().to_string()).collect()
    }

    #[test]
    fn numeric_runs_compare_by_value() {
        assert_eq!(
            sorted(&["img10.png", "img2.png", "img1.png"]),
            vec!["img1.png", "img2.png", "img10.png"]
        );
        assert!(natural_key("2.jpg") < natural_key("10.jpg"));
    }

    #[test]
    fn text_runs_are_case_insensitive() {
        assert_eq!(natural_key("Page3.JPG"), natural_key("page3.jpg"));
        assert_eq!(
            sorted(&["b1.png", "A2.png", "a1.png"]),
            vec!["a1.png", "A2.png", "b1.png"]
        );
    }

    #[test]
    fn key_shape_alternates_from_text() {
        assert_eq!(
            natural_key("2.jpg"),
            vec![
                KeyPart::Text(String::new()),
                KeyPart::Number("2".into()),
                KeyPart::Text(".jpg".into()),
            ]
        );
        assert_eq!(
            natural_key("scan7"),
            vec![
                KeyPart::Text("scan".into()),
                KeyPart::Number("7".into()),
                KeyPart::Text(String::new()),
            ]
        );
    }

    #[test]
    fn leading_zeros_and_long_runs() {
        assert_eq!(natural_key("007.png"), natural_key("7.png"));
        assert!(natural_key("99999999999999999999999.png") > natural_key("100.png"));
        assert_eq!(sorted(&["1.png", "01.png"]), vec!["01.png", "1.png"]);
    }

    #[test]
    fn multiple_digit_runs() {
        assert_eq!(
            sorted(&["ch2_p10.png", "ch10_p1.png", "ch2_p9.png"]),
            vec!["ch2_p9.png", "ch2_p10.png", "ch10_p1.png"]
        );
    }
}
