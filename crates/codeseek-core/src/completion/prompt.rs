//! Instruction templates sent to the generation model.

use std::fmt::Write as _;
use std::path::Path;

use codeseek_index::store::ChunkRow;

use super::context::CompletionContext;

/// Marks the insertion point in local-context prompts.
pub const CURSOR_MARKER: &str = "<CURSOR>";

/// Retrieved chunks, each headed by the basename of its source file.
#[must_use]
pub fn render_chunks(chunks: &[ChunkRow]) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let name = Path::new(&chunk.file)
            .file_name()
            .map_or_else(|| chunk.file.clone(), |n| n.to_string_lossy().into_owned());
        let _ = write!(out, "// From file: {name}\n{}", chunk.text);
    }
    out
}

/// Prompt for retrieval mode: related snippets plus the code before the cursor.
#[must_use]
pub fn retrieval_prompt(ctx: &CompletionContext, sentinel: &str) -> String {
    let mut prompt = String::from("You are an expert AI code assistant.\n");
    if ctx.chunks.is_empty() {
        prompt.push('\n');
    } else {
        prompt.push_str(
            "Use the following relevant code snippets as context to complete the user's code.\n\n",
        );
        let _ = write!(prompt, "<context>\n{}\n</context>\n\n", render_chunks(&ctx.chunks));
    }
    let _ = write!(
        prompt,
        "The user is currently writing in a file. Here is the code they have written so far:\n\
         <file_content>\n{}\n</file_content>\n\n\
         Generate the most logical and helpful completion for the user. Do not include the \
         <file_content> in your response, only provide the code that comes next. If nothing \
         should be added, reply with exactly {sentinel}.\n\n\
         Completion:\n",
        ctx.before
    );
    prompt
}

/// Prompt for local-context mode: both windows joined by the cursor marker.
#[must_use]
pub fn local_context_prompt(ctx: &CompletionContext, sentinel: &str) -> String {
    format!(
        "You are an expert AI code assistant completing code at the cursor.\n\
         The code around the cursor is shown below; {CURSOR_MARKER} marks the insertion point.\n\n\
         <code>\n{}{CURSOR_MARKER}{}\n</code>\n\n\
         Reply with only the code to insert at {CURSOR_MARKER}. Do not repeat code that already \
         appears before or after the cursor and do not wrap the answer in markdown. If nothing \
         should be inserted, reply with exactly {sentinel}.\n",
        ctx.before, ctx.after
    )
}
