//! Fenced code block extraction from free-form model text.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// A code region delimited by triple-backtick fences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// Language tag after the opening fence, if any (`python`, `sh`, ...).
    pub lang: Option<String>,
    pub body: String,
}

// The optional tag group only matches when the tag is followed by a line break,
// so single-line fences like "```x = 1```" keep their first word.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:([A-Za-z0-9_+#.\-]*)[ \t]*\r?\n)?(.*?)```")
        .expect("fence pattern is valid")
});

static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("think pattern is valid"));

/// Drop `<think>...</think>` sections emitted by reasoning models.
pub fn strip_reasoning(text: &str) -> Cow<'_, str> {
    THINK_RE.replace_all(text, " ")
}

/// Extract every non-blank fenced block in source order.
///
/// Reasoning sections are removed first. Matching is non-greedy, so adjacent
/// blocks never merge. An unterminated trailing fence is ignored.
pub fn extract_blocks(text: &str) -> Vec<FencedBlock> {
    let text = strip_reasoning(text);
    FENCE_RE
        .captures_iter(&text)
        .filter_map(|caps| {
            let body = caps.get(2).map_or("", |m| m.as_str());
            let body = body.trim_start_matches(['\r', '\n']).trim_end();
            if body.is_empty() {
                return None;
            }
            let lang = caps
                .get(1)
                .map(|m| m.as_str())
                .filter(|tag| !tag.is_empty())
                .map(str::to_string);
            Some(FencedBlock {
                lang,
                body: body.to_string(),
            })
        })
        .collect()
}

/// Extract block bodies only.
pub fn extract(text: &str) -> Vec<String> {
    extract_blocks(text)
        .into_iter()
        .map(|block| block.body)
        .collect()
}

/// The canonical artifact of a reply: its first fenced block.
pub fn first_block(text: &str) -> Option<String> {
    extract(text).into_iter().next()
}
