//! Cursor-centred context windows.

use codeseek_index::store::ChunkRow;

/// Request-scoped context around a cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionContext {
    /// Preceding lines plus the current line up to the cursor.
    pub before: String,
    /// Rest of the current line plus the following lines.
    pub after: String,
    /// Current line up to the cursor.
    pub line_prefix: String,
    /// Retrieved chunks, nearest first.
    pub chunks: Vec<ChunkRow>,
}

impl CompletionContext {
    /// Build the windows for a cursor at `line`/`column` (zero-based, column in
    /// characters). Out-of-range positions are clamped.
    #[must_use]
    pub fn around_cursor(
        text: &str,
        line: usize,
        column: usize,
        before_lines: usize,
        after_lines: usize,
    ) -> Self {
        let lines: Vec<&str> = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect();
        let line = line.min(lines.len() - 1);
        let current = lines[line];

        let split_at = current
            .char_indices()
            .nth(column)
            .map_or(current.len(), |(i, _)| i);
        let (prefix, suffix) = current.split_at(split_at);

        let first = line.saturating_sub(before_lines);
        let mut before = String::new();
        for l in &lines[first..line] {
            before.push_str(l);
            before.push('\n');
        }
        before.push_str(prefix);

        let mut after = suffix.to_owned();
        let last = (line + after_lines).min(lines.len() - 1);
        for l in &lines[line + 1..=last] {
            after.push('\n');
            after.push_str(l);
        }

        Self {
            before,
            after,
            line_prefix: prefix.to_owned(),
            chunks: Vec::new(),
        }
    }
}
