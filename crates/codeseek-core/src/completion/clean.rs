//! Post-processing of raw model output into an insertable completion.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::context::CompletionContext;
use super::prompt::CURSOR_MARKER;
use crate::config::CompletionMode;

static LEADING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^```[A-Za-z0-9_+-]*\r?\n").expect("leading fence regex is valid")
});

static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```\s*$").expect("trailing fence regex is valid"));

/// Clean a raw generation. `None` means no suggestion.
#[must_use]
pub fn clean_completion(
    raw: &str,
    mode: CompletionMode,
    ctx: &CompletionContext,
    sentinel: &str,
) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == sentinel {
        return None;
    }

    let cleaned = match mode {
        CompletionMode::Retrieval => clean_retrieval(trimmed, &ctx.before),
        CompletionMode::LocalContext => clean_local(trimmed, ctx),
    };

    if cleaned.is_empty() || cleaned.trim() == sentinel {
        None
    } else {
        Some(cleaned)
    }
}

fn clean_retrieval(text: &str, before: &str) -> String {
    if !before.is_empty()
        && let Some(rest) = text.strip_prefix(before)
    {
        return rest.trim().to_owned();
    }
    strip_fences(text).trim().to_owned()
}

fn clean_local(text: &str, ctx: &CompletionContext) -> String {
    let text = strip_fences(text);

    let window_lines: HashSet<&str> = ctx
        .before
        .lines()
        .chain(ctx.after.lines())
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let kept: Vec<&str> = text
        .lines()
        .filter(|l| !window_lines.contains(l.trim()))
        .collect();
    let joined = kept.join("\n").replace(CURSOR_MARKER, "");

    let mut out = joined.trim_start();
    let prefix = ctx.line_prefix.trim_start();
    if !prefix.is_empty()
        && let Some(rest) = out.strip_prefix(prefix)
    {
        out = rest;
    }
    out.trim_end().to_owned()
}

/// Drop a leading ```` ```lang ```` line and a trailing ```` ``` ````.
fn strip_fences(text: &str) -> String {
    let body = LEADING_FENCE.replace(text, "");
    TRAILING_FENCE.replace(&body, "").into_owned()
}
