//! Core data models shared by the chat path and the batch utilities.

use serde::{Deserialize, Serialize};

/// A normalized citation pointing at one source document.
///
/// Every field other than the storage URI comes from the knowledge-base
/// metadata bag and may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub filename: Option<String>,
    pub storage_uri: Option<String>,
    pub agency: Option<String>,
    pub title: Option<String>,
    pub law: Option<String>,
}

impl Reference {
    /// Composite key used for deduplication within one answer.
    pub fn dedup_key(&self) -> (Option<&str>, Option<&str>, Option<&str>, Option<&str>) {
        (
            self.filename.as_deref(),
            self.agency.as_deref(),
            self.title.as_deref(),
            self.law.as_deref(),
        )
    }

    /// Human-readable label: the filename, else the storage URI.
    pub fn label(&self) -> Option<&str> {
        self.filename.as_deref().or(self.storage_uri.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a session's chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-document metadata written to a `.metadata.json` sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub agency: String,
    pub title: String,
    pub filename: String,
    /// `"true"` or `"false"`; the knowledge base filters on string attributes.
    pub is_scanned: String,
}

impl MetadataRecord {
    pub fn new(
        agency: impl Into<String>,
        title: impl Into<String>,
        filename: impl Into<String>,
        is_scanned: bool,
    ) -> Self {
        Self {
            agency: agency.into(),
            title: title.into(),
            filename: filename.into(),
            is_scanned: is_scanned.to_string(),
        }
    }

    pub fn scanned(&self) -> bool {
        self.is_scanned == "true"
    }
}

/// On-disk sidecar layout expected by the knowledge-base ingestion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sidecar {
    #[serde(rename = "metadataAttributes")]
    pub metadata_attributes: MetadataRecord,
}
