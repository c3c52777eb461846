//! Whitespace and control-character cleanup for extracted text

use regex_lite::Regex;
use std::sync::OnceLock;

fn horizontal_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").expect("horizontal whitespace pattern is valid"))
}

fn blank_line_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("blank line pattern is valid"))
}

/// Normalize extracted text:
/// unify line endings, drop non-printable characters, collapse spaces and
/// tabs, trim each line, keep at most one blank line in a row.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let printable: String = unified
        .chars()
        .map(|c| match c {
            '\u{FEFF}' => ' ',
            '\n' | '\t' => c,
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    let collapsed = horizontal_runs().replace_all(&printable, " ");

    let trimmed_lines = collapsed
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    blank_line_runs()
        .replace_all(&trimmed_lines, "\n\n")
        .trim()
        .to_string()
}

/// Count of non-whitespace characters
pub fn usable_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        let input = "  Hello \t  World  \r\n\r\n\r\n\r\nNext\u{0007} line\rlast  ";
        assert_eq!(normalize(input), "Hello World\n\nNext line\nlast");
    }

    #[test]
    fn test_normalize_keeps_single_blank_line() {
        assert_eq!(normalize("a\n\nb"), "a\n\nb");
        assert_eq!(normalize("a\n \n \n b"), "a\n\nb");
    }

    #[test]
    fn test_usable_chars() {
        assert_eq!(usable_chars(" a b\n\tc "), 3);
        assert_eq!(usable_chars(""), 0);
    }
}
