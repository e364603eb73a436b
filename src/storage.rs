//! Document storage seam.
//!
//! Stages only talk to [`DocumentStore`]; the filesystem implementation is
//! the production backend.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::model::DocumentVersion;
use crate::util::{ensure_directory, line_count, sha256_text};

pub trait DocumentStore {
    /// Documents under `base` matching the glob `pattern`, sorted by path.
    fn find_documents(&self, base: &Path, pattern: &str) -> Result<Vec<DocumentVersion>>;

    fn read_document(&self, path: &Path) -> Result<String>;

    /// Creates parent directories as needed.
    fn write_document(&self, path: &Path, content: &str) -> Result<()>;

    fn document_exists(&self, path: &Path) -> bool;

    fn create_directory(&self, path: &Path) -> Result<()>;

    /// Names of the immediate subdirectories of `base`, sorted.
    fn list_folders(&self, base: &Path) -> Result<Vec<String>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemStore;

impl FileSystemStore {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentStore for FileSystemStore {
    fn find_documents(&self, base: &Path, pattern: &str) -> Result<Vec<DocumentVersion>> {
        if !base.exists() {
            bail!("base path not found: {}", base.display());
        }
        if !base.is_dir() {
            bail!("path is not a directory: {}", base.display());
        }

        let folder = base
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 folder name: {}", base.display()))?;

        let full_pattern = base.join(pattern);
        let full_pattern = full_pattern
            .to_str()
            .with_context(|| format!("invalid UTF-8 glob pattern: {}", full_pattern.display()))?;

        let mut paths = glob::glob(full_pattern)
            .with_context(|| format!("invalid glob pattern: {full_pattern}"))?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(err) => {
                    warn!(error = %err, "failed to inspect glob match");
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect::<Vec<PathBuf>>();
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            match load_version(&path, &folder) {
                Ok(version) => {
                    debug!(
                        path = %path.display(),
                        lines = version.line_count,
                        "found document"
                    );
                    documents.push(version);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to read document");
                }
            }
        }

        info!(path = %base.display(), found = documents.len(), "document search complete");
        Ok(documents)
    }

    fn read_document(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            bail!("document not found: {}", path.display());
        }
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }

    fn write_document(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }
        fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), size = content.len(), "document written");
        Ok(())
    }

    fn document_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        ensure_directory(path)
    }

    fn list_folders(&self, base: &Path) -> Result<Vec<String>> {
        if !base.is_dir() {
            bail!("path is not a directory: {}", base.display());
        }

        let entries =
            fs::read_dir(base).with_context(|| format!("failed to read {}", base.display()))?;

        let mut folders = Vec::new();
        for entry in entries {
            let entry =
                entry.with_context(|| format!("failed to read entry in {}", base.display()))?;
            let path = entry.path();

            if !entry
                .file_type()
                .with_context(|| format!("failed to inspect file type: {}", path.display()))?
                .is_dir()
            {
                continue;
            }

            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                folders.push(name.to_string());
            }
        }

        folders.sort();
        Ok(folders)
    }
}

fn load_version(path: &Path, folder: &str) -> Result<DocumentVersion> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let modified = fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .with_context(|| format!("failed to read modification time: {}", path.display()))?;

    Ok(DocumentVersion {
        path: path.to_path_buf(),
        folder: folder.to_string(),
        line_count: line_count(&content),
        modified: DateTime::<Utc>::from(modified),
        content_hash: sha256_text(&content),
        content,
    })
}
