use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content-addressed key for a document's text (blake3 hex hash).
pub type ContentHash = String;

/// Metadata attached to a corpus record. Known fields are lifted out;
/// everything else is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, alias = "PROJECT", alias = "project_name", skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, alias = "NAME", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "FILE_NAME", alias = "FILE", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DocumentMetadata {
    /// Project the document belongs to. Falls back to `NAME`, which some
    /// corpus exports use for the project.
    pub fn project_label(&self) -> &str {
        self.project
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("unknown")
    }
}

/// One corpus record. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn content_hash(&self) -> ContentHash {
        blake3::hash(self.content.as_bytes()).to_hex().to_string()
    }

    /// Short human label, e.g. `EDEN / interview-03.txt`.
    pub fn label(&self) -> String {
        match &self.metadata.file_name {
            Some(file) => format!("{} / {}", self.metadata.project_label(), file),
            None => self.metadata.project_label().to_string(),
        }
    }
}
