use crate::error::{AnalysisError, IngestError, InputError};
use crate::models::{AnalysisReport, DocumentId};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const ID_DIGEST_CHARS: usize = 12;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if has_pdf_extension(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Rejects paths that cannot be analysed before any work is done.
pub fn validate_pdf_path(path: &Path) -> Result<(), InputError> {
    if !path.is_file() {
        return Err(InputError::MissingFile(path.to_path_buf()));
    }
    if !has_pdf_extension(path) {
        return Err(InputError::NotPdf(path.to_path_buf()));
    }
    Ok(())
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// `<sanitized stem>-<first 12 hex digits of the file's sha256>`. The same
/// bytes always map to the same id; different files sharing a name do not.
pub fn derive_document_id(path: &Path) -> Result<DocumentId, AnalysisError> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    let checksum = digest_file(path)?;
    let id = format!(
        "{}-{}",
        sanitize_stem(stem),
        &checksum[..ID_DIGEST_CHARS]
    );
    Ok(DocumentId::new(id)?)
}

fn sanitize_stem(stem: &str) -> String {
    let mapped: String = stem
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    let trimmed = mapped.trim_matches('-');
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderReport {
    pub analyzed: Vec<AnalysisReport>,
    pub skipped_files: Vec<SkippedPdf>,
}
