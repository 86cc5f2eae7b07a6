use crate::frontmatter;
use kb_chunker::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions the loader treats as knowledge-base documents.
const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static NEWLINE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// A file the loader could not ingest. Per-file and non-fatal: the batch
/// always continues.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Reads a source directory of text documents, separating structured
/// header metadata from body text.
pub struct DocumentLoader {
    root: PathBuf,
}

impl DocumentLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Load every supported file under the root.
    ///
    /// Unreadable files are skipped and reported; malformed headers fall
    /// back to "whole file is body". Traversal is sorted by file name so
    /// repeated loads of the same tree produce the same document sequence.
    pub fn load(&self) -> (Vec<Document>, Vec<LoadFailure>) {
        let mut documents = Vec::new();
        let mut failures = Vec::new();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Failed to read directory entry: {e}");
                    failures.push(LoadFailure {
                        path: e.path().map_or_else(|| self.root.clone(), Path::to_path_buf),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() || !is_supported(entry.path()) {
                continue;
            }

            match self.load_file(entry.path()) {
                Ok(document) => documents.push(document),
                Err(reason) => {
                    log::warn!("Skipping {}: {reason}", entry.path().display());
                    failures.push(LoadFailure {
                        path: entry.path().to_path_buf(),
                        reason,
                    });
                }
            }
        }

        log::info!(
            "Loaded {} documents from {} ({} failures)",
            documents.len(),
            self.root.display(),
            failures.len()
        );
        (documents, failures)
    }

    fn load_file(&self, path: &Path) -> std::result::Result<Document, String> {
        let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;

        let (frontmatter, body) = frontmatter::parse(&content);
        let relative = path.strip_prefix(&self.root).unwrap_or(path);

        Ok(Document::new(
            document_id_for(relative),
            path,
            normalize_body(&body),
            frontmatter,
        ))
    }
}

/// Stable document id: first 16 hex chars of SHA-256 of the
/// knowledge-base-relative path. Filesystem-location independent, so
/// reindexing the same tree from anywhere reproduces the same ids.
#[must_use]
pub fn document_id_for(relative_path: &Path) -> String {
    let normalized = relative_path.to_string_lossy().replace('\\', "/");
    let digest = Sha256::digest(normalized.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// Light whitespace cleanup before chunking: collapse space/tab runs and
/// runs of three-or-more newlines, trim the ends.
#[must_use]
pub fn normalize_body(text: &str) -> String {
    let collapsed_spaces = SPACE_RUNS.replace_all(text, " ");
    let collapsed_newlines = NEWLINE_RUNS.replace_all(&collapsed_spaces, "\n\n");
    collapsed_newlines.trim().to_string()
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_lowercase();
            SUPPORTED_EXTENSIONS.iter().any(|candidate| *candidate == ext)
        })
}
