//! Pure `(old content, operations) -> new content` transforms.
//!
//! Every applier works on a private copy and either returns the complete new
//! content or a [`PatchError`]; there is no partial output.

pub mod json;
pub mod line;
pub mod text;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use json::JsonPatchOp;
pub use line::LineOp;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("malformed operation: {0}")]
    MalformedOperation(String),
    #[error("invalid JSON pointer '{0}'")]
    InvalidPointer(String),
    #[error("no value at '{0}'")]
    PathNotFound(String),
    #[error("array index out of bounds at '{0}'")]
    IndexOutOfBounds(String),
    #[error("document is not valid JSON: {0}")]
    InvalidDocument(String),
    #[error("line {line} is out of range (file has {len} lines)")]
    LineOutOfRange { line: usize, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Json,
    Code,
    Markdown,
    Yaml,
    Xml,
    Text,
}

impl FileType {
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Self::Json,
            "md" | "markdown" => Self::Markdown,
            "yaml" | "yml" => Self::Yaml,
            "xml" | "xsd" | "svg" | "html" | "htm" => Self::Xml,
            "rs" | "py" | "js" | "jsx" | "ts" | "tsx" | "go" | "c" | "h" | "cc" | "cpp"
            | "hpp" | "java" | "kt" | "rb" | "sh" | "bash" | "toml" | "css" | "scss"
            | "sql" | "swift" | "cs" | "php" | "lua" => Self::Code,
            _ => Self::Text,
        }
    }

    pub fn supports_json_patch(self) -> bool {
        self == Self::Json
    }

    pub fn supports_line_patch(self) -> bool {
        self != Self::Json
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Code => write!(f, "code"),
            Self::Markdown => write!(f, "markdown"),
            Self::Yaml => write!(f, "yaml"),
            Self::Xml => write!(f, "xml"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Exactly one kind of edit per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchRequest {
    JsonPatch(Vec<JsonPatchOp>),
    Lines(Vec<LineOp>),
    Text(String),
}

impl PatchRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JsonPatch(_) => "json_patch",
            Self::Lines(_) => "line",
            Self::Text(_) => "text",
        }
    }

    /// Full-text replacement is legal for every type.
    pub fn is_allowed_for(&self, file_type: FileType) -> bool {
        match self {
            Self::JsonPatch(_) => file_type.supports_json_patch(),
            Self::Lines(_) => file_type.supports_line_patch(),
            Self::Text(_) => true,
        }
    }

    pub fn apply(&self, old: &str) -> Result<String, PatchError> {
        match self {
            Self::JsonPatch(ops) => json::apply(old, ops),
            Self::Lines(ops) => line::apply(old, ops),
            Self::Text(new) => Ok(text::apply(old, new)),
        }
    }
}
