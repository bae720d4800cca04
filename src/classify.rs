//! Document metadata sidecars.
//!
//! Walks the data root and, for every PDF, writes
//! `<name>.pdf.metadata.json` next to it so the knowledge-base ingestion job
//! can filter by agency, title and scan status.
//!
//! Each file goes through open → read first page → classify → write sidecar.
//! A PDF is treated as scanned (image-only) unless its first page yields at
//! least `min_text_chars` characters of trimmed text; unreadable PDFs count
//! as scanned too, so they are never silently dropped from OCR handling.
//!
//! Folder layout decides the tags, relative to the data root:
//!
//! | Path | Title | Agency |
//! |------|-------|--------|
//! | `doc.pdf` | `Root` | `Unknown` |
//! | `Title 13/doc.pdf` | `Title 13` | `Title 13` |
//! | `Title 10/Agency/.../doc.pdf` | `Title 10` | `Agency` |

use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::models::{MetadataRecord, Sidecar};

const SIDECAR_SUFFIX: &str = ".metadata.json";
const PROGRESS_EVERY: usize = 10;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to write sidecar {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode sidecar: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0} has no file name")]
    NoFileName(PathBuf),
}

/// Outcome of reading a document's first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstPage {
    /// Trimmed text length in characters.
    Text(usize),
    /// The first page exists but has no extractable text.
    Empty,
    NoPages,
    Unreadable(String),
}

impl FirstPage {
    pub fn is_scanned(&self, min_text_chars: usize) -> bool {
        match self {
            FirstPage::Text(n) => *n < min_text_chars,
            FirstPage::Empty | FirstPage::NoPages | FirstPage::Unreadable(_) => true,
        }
    }
}

/// Extract the first page's text length. Never modifies the file.
pub fn read_first_page(path: &Path) -> FirstPage {
    let doc = match lopdf::Document::load(path) {
        Ok(doc) => doc,
        Err(e) => return FirstPage::Unreadable(e.to_string()),
    };
    let pages = doc.get_pages();
    let Some(&first) = pages.keys().next() else {
        return FirstPage::NoPages;
    };
    match doc.extract_text(&[first]) {
        Ok(text) => match text.trim().chars().count() {
            0 => FirstPage::Empty,
            n => FirstPage::Text(n),
        },
        Err(e) => FirstPage::Unreadable(e.to_string()),
    }
}

/// `(title, agency)` for a document path relative to the data root.
pub fn layout_tags(relative: &Path) -> (String, String) {
    let folders: Vec<String> = relative
        .parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();

    match folders.as_slice() {
        [] => ("Root".to_string(), "Unknown".to_string()),
        [only] => (only.clone(), only.clone()),
        [title, agency, ..] => (title.clone(), agency.clone()),
    }
}

/// Sidecar location for `document`: same folder, name plus `.metadata.json`.
pub fn sidecar_path(document: &Path) -> Option<PathBuf> {
    let name = document.file_name()?.to_string_lossy();
    Some(document.with_file_name(format!("{}{}", name, SIDECAR_SUFFIX)))
}

/// Write (overwriting) the sidecar for `document`.
pub fn write_sidecar(document: &Path, record: &MetadataRecord) -> Result<PathBuf, ClassifyError> {
    let path =
        sidecar_path(document).ok_or_else(|| ClassifyError::NoFileName(document.to_path_buf()))?;
    let sidecar = Sidecar {
        metadata_attributes: record.clone(),
    };
    let json = serde_json::to_string_pretty(&sidecar)?;
    std::fs::write(&path, json).map_err(|source| ClassifyError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Read a sidecar back.
pub fn read_sidecar(path: &Path) -> Result<MetadataRecord> {
    let content = std::fs::read_to_string(path)?;
    let sidecar: Sidecar = serde_json::from_str(&content)?;
    Ok(sidecar.metadata_attributes)
}

/// Classify one document and write its sidecar.
pub fn classify_document(
    root: &Path,
    document: &Path,
    min_text_chars: usize,
) -> Result<MetadataRecord, ClassifyError> {
    let relative = document.strip_prefix(root).unwrap_or(document);
    let filename = document
        .file_name()
        .ok_or_else(|| ClassifyError::NoFileName(document.to_path_buf()))?
        .to_string_lossy()
        .to_string();
    let (title, agency) = layout_tags(relative);

    let first_page = read_first_page(document);
    if let FirstPage::Unreadable(ref reason) = first_page {
        tracing::warn!(file = %filename, %reason, "could not read PDF, marking as scanned");
    }
    let scanned = first_page.is_scanned(min_text_chars);
    if scanned {
        tracing::info!(file = %filename, "scanned/image document detected");
    }

    let record = MetadataRecord::new(agency, title, filename, scanned);
    write_sidecar(document, &record)?;
    Ok(record)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MetadataSummary {
    pub processed: usize,
    pub scanned: usize,
    pub failed: usize,
}

/// All PDFs under `root`, in path order.
///
/// Entries that cannot be read (for example a folder without permission) are
/// logged and skipped.
pub fn find_documents(root: &Path) -> Result<Vec<PathBuf>> {
    let mut unreadable = 0;
    walk_documents(root, &mut unreadable)
}

fn walk_documents(root: &Path, unreadable: &mut usize) -> Result<Vec<PathBuf>> {
    let matcher = pdf_matcher()?;
    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                *unreadable += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if matcher.is_match(relative) {
            documents.push(path.to_path_buf());
        }
    }
    Ok(documents)
}

fn pdf_matcher() -> Result<GlobMatcher> {
    Ok(GlobBuilder::new("**/*.pdf")
        .case_insensitive(true)
        .build()?
        .compile_matcher())
}

/// Generate sidecars for every PDF under `root`, one file at a time.
///
/// A file whose sidecar cannot be written, or a folder that cannot be
/// listed, is logged and counted as failed; the run continues.
pub fn generate_metadata(root: &Path, min_text_chars: usize) -> Result<MetadataSummary> {
    if !root.is_dir() {
        bail!("data directory not found at {}", root.display());
    }
    tracing::info!(root = %root.display(), "scanning directory");

    let mut summary = MetadataSummary::default();
    let documents = walk_documents(root, &mut summary.failed)?;
    for document in documents {
        match classify_document(root, &document, min_text_chars) {
            Ok(record) => {
                summary.processed += 1;
                if record.scanned() {
                    summary.scanned += 1;
                }
                if summary.processed % PROGRESS_EVERY == 0 {
                    tracing::info!("processed {} files...", summary.processed);
                }
            }
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(file = %document.display(), error = %e, "skipping document");
            }
        }
    }

    tracing::info!(
        processed = summary.processed,
        scanned = summary.scanned,
        failed = summary.failed,
        "metadata generation complete"
    );
    Ok(summary)
}
