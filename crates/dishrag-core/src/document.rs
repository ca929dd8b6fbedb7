//! Document access: the corpus the pipeline reads rules and context from.
//!
//! The pipeline only talks to [`DocumentStore`]. [`FsStore`] serves a
//! directory of markdown notes; [`MemoryStore`] serves content handed over
//! by a host (and backs most tests).

use std::io::{Error as IoError, ErrorKind};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{CoreError, Result};

/// A document with its content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the corpus root, `/`-separated.
    pub path: String,
    /// Display name (file stem).
    pub name: String,
    pub content: String,
}

/// An enumerated document whose content has not been read yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMeta {
    pub path: String,
    pub name: String,
}

impl DocumentMeta {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = document_name(&path);
        Self { path, name }
    }
}

/// Display name for a corpus path: the file name without its extension.
pub fn document_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Read-only access to a corpus.
///
/// `list` must return the same order for the same corpus within one run;
/// nothing is promised across runs.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(&self) -> Result<Vec<DocumentMeta>>;

    /// Look a document up by exact path. `Ok(None)` when it does not exist.
    async fn read_by_path(&self, path: &str) -> Result<Option<Document>>;
}

// --- Filesystem ---

/// Markdown files under a root directory. Hidden files and directories are skipped.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a corpus path under the root. Absolute paths and `..` are rejected.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let rel = Path::new(path);
        let contained = !path.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        contained.then(|| self.root.join(rel))
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

fn to_corpus_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Blocking directory walk; run it off the async threads.
fn walk_markdown(root: &Path) -> Result<Vec<DocumentMeta>> {
    let mut docs = Vec::new();
    // hidden entries are skipped; ignore files are not consulted
    let walker = WalkBuilder::new(root).standard_filters(false).hidden(true).build();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) || !is_markdown(entry.path()) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        docs.push(DocumentMeta::new(to_corpus_path(rel)));
    }
    docs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(docs)
}

#[async_trait]
impl DocumentStore for FsStore {
    async fn list(&self) -> Result<Vec<DocumentMeta>> {
        let root = self.root.clone();
        let docs = tokio::task::spawn_blocking(move || walk_markdown(&root))
            .await
            .map_err(|e| CoreError::io(&self.root, IoError::other(e)))??;
        debug!(root = %self.root.display(), count = docs.len(), "listed corpus");
        Ok(docs)
    }

    async fn read_by_path(&self, path: &str) -> Result<Option<Document>> {
        let Some(full) = self.resolve(path) else {
            return Ok(None);
        };
        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CoreError::io(full, e)),
        }
        let content = tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| CoreError::io(&full, e))?;
        Ok(Some(Document {
            path: path.to_string(),
            name: document_name(path),
            content,
        }))
    }
}

// --- In memory ---

/// An ordered in-memory corpus. `list` returns documents in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Vec<Document>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(path, content)` pairs; names are derived from the paths.
    pub fn from_pairs<P, C>(pairs: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: Into<String>,
    {
        let mut store = Self::new();
        for (path, content) in pairs {
            store.insert(path, content);
        }
        store
    }

    /// Add a document, replacing the content of an existing one with the same path.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        let content = content.into();
        if let Some(doc) = self.docs.iter_mut().find(|d| d.path == path) {
            doc.content = content;
            return;
        }
        self.docs.push(Document {
            name: document_name(&path),
            path,
            content,
        });
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list(&self) -> Result<Vec<DocumentMeta>> {
        Ok(self
            .docs
            .iter()
            .map(|d| DocumentMeta {
                path: d.path.clone(),
                name: d.name.clone(),
            })
            .collect())
    }

    async fn read_by_path(&self, path: &str) -> Result<Option<Document>> {
        Ok(self.docs.iter().find(|d| d.path == path).cloned())
    }
}
