//! Flattening of PGN movetext into the mainline SAN tokens.

use std::sync::LazyLock;

use regex::Regex;

/// Brace comments and `;` rest-of-line comments, whichever opens first.
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*?\}|;[^\n]*").expect("comment pattern is valid"));

/// Innermost variation only; applied repeatedly to peel nested ones.
static VARIATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^()]*\)").expect("variation pattern is valid"));

static MOVE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\.+").expect("move number pattern is valid"));

const RESULT_TOKENS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// Reduce raw movetext to the ordered mainline SAN tokens.
///
/// Comments, variations (at any depth), move numbers, NAGs and result
/// markers are removed. No ply cap is applied here.
pub fn normalize_movetext(movetext: &str) -> Vec<String> {
    let mut text = COMMENT_RE.replace_all(movetext, " ").into_owned();

    while VARIATION_RE.is_match(&text) {
        text = VARIATION_RE.replace_all(&text, " ").into_owned();
    }
    // An unterminated variation leaves stray parentheses behind.
    let text = text.replace(['(', ')'], " ");

    let text = MOVE_NUMBER_RE.replace_all(&text, " ");

    text.split_whitespace()
        .filter(|token| !is_noise_token(token))
        .map(str::to_string)
        .collect()
}

/// The result marker a movetext ends with, if any.
pub fn trailing_result(movetext: &str) -> Option<&str> {
    movetext
        .split_whitespace()
        .last()
        .filter(|token| RESULT_TOKENS.contains(token))
}

fn is_noise_token(token: &str) -> bool {
    RESULT_TOKENS.contains(&token)
        || token == "e.p."
        || (token.starts_with('$') && token[1..].chars().all(|c| c.is_ascii_digit()))
        || token.chars().all(|c| c == '!' || c == '?')
}
