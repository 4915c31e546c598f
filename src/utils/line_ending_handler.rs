use regex::Regex;
use std::sync::LazyLock;

static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r?\n").expect("valid line break regex"));

/// Splits text on `\r?\n`. A trailing line break yields a final empty
/// line, so line numbers match what an editor shows.
pub fn split_lines(content: &str) -> Vec<&str> {
    LINE_BREAK.split(content).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_lf_and_crlf() {
        assert_eq!(split_lines("a\r\nb\nc"), vec!["a", "b", "c"]);
    }

    #[test]
    fn keeps_lone_carriage_returns_inside_lines() {
        assert_eq!(split_lines("a\rb\n"), vec!["a\rb", ""]);
    }

    #[test]
    fn empty_content_is_one_empty_line() {
        assert_eq!(split_lines(""), vec![""]);
    }
}
