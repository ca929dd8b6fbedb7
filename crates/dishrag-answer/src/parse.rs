use std::sync::LazyLock;

use regex::Regex;

/// A reasoning trace emitted by thinking models ahead of the answer.
static REASONING_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid reasoning pattern"));

/// Strip `<think>…</think>` blocks from a raw reply and trim it.
///
/// Removal repeats until no marker pair is left, so a block that only forms
/// once an inner one is removed is stripped too, and the result is stable
/// under a second pass.
pub fn strip_reasoning(raw: &str) -> String {
    let mut text = raw.to_string();
    while REASONING_BLOCK.is_match(&text) {
        text = REASONING_BLOCK.replace_all(&text, "").into_owned();
    }
    text.trim().to_string()
}
