use serde::{Deserialize, Serialize};

use super::PatchError;

/// Line-addressed edit. Line numbers are 1-based and refer to the original
/// content; operations run highest line first so earlier edits never shift
/// the lines later ones address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LineOp {
    ReplaceLine { line: usize, content: String },
    RemoveLine { line: usize },
    /// Insert before `line`; `len + 1` appends.
    InsertAt { line: usize, content: String },
    AddLine { content: String },
    /// Drop `line` and everything after it.
    DeleteFrom { line: usize },
}

impl LineOp {
    fn sort_key(&self) -> usize {
        match self {
            Self::ReplaceLine { line, .. }
            | Self::RemoveLine { line }
            | Self::InsertAt { line, .. }
            | Self::DeleteFrom { line } => *line,
            Self::AddLine { .. } => usize::MAX,
        }
    }
}

/// Out-of-range line numbers are rejected, never clamped or skipped.
pub fn apply(old: &str, ops: &[LineOp]) -> Result<String, PatchError> {
    let trailing_newline = old.ends_with('\n');
    let mut lines: Vec<String> = split_lines(old);

    let mut ordered: Vec<&LineOp> = ops.iter().collect();
    // Stable: ops on the same line keep their request order.
    ordered.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));

    for op in ordered {
        let len = lines.len();
        match op {
            LineOp::ReplaceLine { line, content } => {
                let idx = existing_index(*line, len)?;
                lines[idx] = content.clone();
            }
            LineOp::RemoveLine { line } => {
                let idx = existing_index(*line, len)?;
                lines.remove(idx);
            }
            LineOp::InsertAt { line, content } => {
                if *line == 0 || *line > len + 1 {
                    return Err(PatchError::LineOutOfRange { line: *line, len });
                }
                lines.insert(line - 1, content.clone());
            }
            LineOp::AddLine { content } => lines.push(content.clone()),
            LineOp::DeleteFrom { line } => {
                let idx = existing_index(*line, len)?;
                lines.truncate(idx);
            }
        }
    }

    let mut out = lines.join("\n");
    if !lines.is_empty() && (trailing_newline || old.is_empty()) {
        out.push('\n');
    }
    Ok(out)
}

fn split_lines(content: &str) -> Vec<String> {
    if content.is_empty() {
        return vec![];
    }
    let body = content.strip_suffix('\n').unwrap_or(content);
    body.split('\n').map(str::to_string).collect()
}

fn existing_index(line: usize, len: usize) -> Result<usize, PatchError> {
    if line == 0 || line > len {
        return Err(PatchError::LineOutOfRange { line, len });
    }
    Ok(line - 1)
}
