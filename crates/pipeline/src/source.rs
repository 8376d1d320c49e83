use std::fs;
use std::path::Path;

use crate::error::{RenderError, RenderResult};

/// Reads the compute program from disk, normalising every line ending to `\n`.
pub fn load_program_source(path: &Path) -> RenderResult<String> {
    let raw = fs::read_to_string(path).map_err(|source| RenderError::SourceRead {
        path: path.to_path_buf(),
        source,
    })?;
    let source = normalize_newlines(&raw);
    tracing::debug!(
        path = %path.display(),
        bytes = source.len(),
        "loaded compute program source"
    );
    Ok(source)
}

/// Re-emits every line followed by a single `\n`. Lines end at `\r\n`, `\n`
/// or a lone `\r`.
fn normalize_newlines(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len() + 1);
    let mut chars = raw.chars().peekable();
    let mut line_open = false;
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                normalized.push('\n');
                line_open = false;
            }
            '\n' => {
                normalized.push('\n');
                line_open = false;
            }
            other => {
                normalized.push(other);
                line_open = true;
            }
        }
    }
    if line_open {
        normalized.push('\n');
    }
    normalized
}
