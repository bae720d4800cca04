//! Citation normalization.
//!
//! Turns the loosely typed references returned by the knowledge base into
//! [`Reference`] records and removes duplicates. Deduplication is stable:
//! the first occurrence of each `(filename, agency, title, law)` key is kept
//! and the citation order of the service is preserved.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::models::Reference;

/// A retrieved reference as returned by the retrieve-and-generate API.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedReference {
    #[serde(default)]
    pub location: Option<ReferenceLocation>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceLocation {
    #[serde(default)]
    pub s3_location: Option<S3Location>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct S3Location {
    #[serde(default)]
    pub uri: Option<String>,
}

impl RetrievedReference {
    pub fn uri(&self) -> Option<&str> {
        self.location
            .as_ref()
            .and_then(|l| l.s3_location.as_ref())
            .and_then(|s| s.uri.as_deref())
            .filter(|u| !u.is_empty())
    }

    fn metadata_str(&self, key: &str) -> Option<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Last path segment of a storage URI.
pub fn filename_from_uri(uri: &str) -> Option<String> {
    let name = uri.rsplit('/').next().unwrap_or(uri);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

impl From<&RetrievedReference> for Reference {
    fn from(raw: &RetrievedReference) -> Self {
        let uri = raw.uri();
        Reference {
            filename: uri.and_then(filename_from_uri),
            storage_uri: uri.map(str::to_string),
            agency: raw.metadata_str("agency"),
            title: raw.metadata_str("title"),
            law: raw.metadata_str("law"),
        }
    }
}

/// Normalize raw references and drop duplicates, keeping first occurrences.
pub fn normalize(raw: &[RetrievedReference]) -> Vec<Reference> {
    dedup(raw.iter().map(Reference::from))
}

/// Stable dedup over [`Reference::dedup_key`].
pub fn dedup(refs: impl IntoIterator<Item = Reference>) -> Vec<Reference> {
    let refs: Vec<Reference> = refs.into_iter().collect();
    let keep: Vec<bool> = {
        let mut seen = HashSet::new();
        refs.iter().map(|r| seen.insert(r.dedup_key())).collect()
    };
    refs.into_iter()
        .zip(keep)
        .filter_map(|(r, first)| first.then_some(r))
        .collect()
}
