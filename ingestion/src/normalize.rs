use once_cell::sync::Lazy;
use regex::Regex;

static SOFT_HYPHEN_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"-\n").unwrap());
static EXCESS_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static HORIZONTAL_WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\t\x0b\x0c\r]+").unwrap());

/// Cleans raw extracted text before chunking: rejoins hyphen-broken words
/// across line wraps, collapses runs of blank lines, folds other whitespace
/// control characters to a single space, and trims trailing whitespace from
/// every line.
pub fn normalize_text(raw: &str) -> String {
    let joined = SOFT_HYPHEN_BREAK.replace_all(raw, "");
    let collapsed_blank = EXCESS_BLANK_LINES.replace_all(&joined, "\n\n");
    let collapsed_horizontal = HORIZONTAL_WHITESPACE_RUN.replace_all(&collapsed_blank, " ");

    let trimmed_lines: Vec<&str> = collapsed_horizontal
        .lines()
        .map(|line| line.trim_end())
        .collect();

    trimmed_lines.join("\n").trim().to_string()
}
