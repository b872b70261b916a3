//! Storage abstraction for the knowledge base.
//!
//! The [`DocumentStore`] trait is everything the merge engine needs from a
//! knowledge-base root: list its documents, read and write files by
//! relative path. The app crate provides a filesystem implementation;
//! [`memory::InMemoryDocumentStore`] backs tests.
//!
//! Paths are always relative to the store root and use `/` separators
//! (e.g. `payment/stripe.md`, `payment/meta.json`).

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;

/// Abstract knowledge-base backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list`](DocumentStore::list) | Knowledge documents under a directory, sorted |
/// | [`read`](DocumentStore::read) | Read a file; missing files are [`StoreError::NotFound`] |
/// | [`write`](DocumentStore::write) | Create or replace a file, creating parent directories |
/// | [`exists`](DocumentStore::exists) | Whether a file is present |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Relative paths of knowledge documents under `dir`, in sorted order.
    /// An empty `dir` lists the whole store.
    async fn list(&self, dir: &str) -> Result<Vec<String>, StoreError>;

    async fn read(&self, path: &str) -> Result<String, StoreError>;

    async fn write(&self, path: &str, content: &str) -> Result<(), StoreError>;

    async fn exists(&self, path: &str) -> Result<bool, StoreError>;
}

/// Normalize a store-relative path.
///
/// Backslashes become `/`, `.` segments and duplicate separators are
/// dropped. Absolute paths and `..` segments are rejected.
pub fn normalize_path(path: &str) -> Result<String, StoreError> {
    let unified = path.trim().replace('\\', "/");
    if unified.starts_with('/') || unified.contains(':') {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(StoreError::InvalidPath(path.to_string())),
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(parts.join("/"))
}

/// Whether `path` lies under `dir` (`""` matches everything).
pub fn is_under(path: &str, dir: &str) -> bool {
    let dir = dir.trim_matches('/');
    dir.is_empty()
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Whether a path names a Markdown knowledge document.
pub fn is_document_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    lower.ends_with(".md") || lower.ends_with(".mdx")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("payment/stripe.md").unwrap(), "payment/stripe.md");
        assert_eq!(normalize_path("./payment//a.md").unwrap(), "payment/a.md");
        assert_eq!(normalize_path("payment\\a.md").unwrap(), "payment/a.md");
    }

    #[test]
    fn test_normalize_rejects_escapes() {
        assert!(normalize_path("../etc/passwd").is_err());
        assert!(normalize_path("a/../../b.md").is_err());
        assert!(normalize_path("/abs.md").is_err());
        assert!(normalize_path("C:/x.md").is_err());
        assert!(normalize_path("").is_err());
    }

    #[test]
    fn test_is_under() {
        assert!(is_under("payment/a.md", ""));
        assert!(is_under("payment/a.md", "payment"));
        assert!(is_under("payment/a.md", "payment/"));
        assert!(!is_under("payments/a.md", "payment"));
    }

    #[test]
    fn test_is_document_path() {
        assert!(is_document_path("a/b.md"));
        assert!(is_document_path("a/B.MDX"));
        assert!(!is_document_path("a/meta.json"));
    }
}
