//! In-memory [`DocumentStore`] for tests.
//!
//! Files live in a `BTreeMap` behind `std::sync::RwLock`, so listing is
//! naturally sorted.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreError;

use super::{is_document_path, is_under, normalize_path, DocumentStore};

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    files: RwLock<BTreeMap<String, String>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(path, content)` pairs.
    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = files
            .into_iter()
            .filter_map(|(p, c)| normalize_path(p).ok().map(|p| (p, c.to_string())))
            .collect();
        Self {
            files: RwLock::new(map),
        }
    }

    /// Snapshot of one file, for assertions.
    pub fn get(&self, path: &str) -> Option<String> {
        let path = normalize_path(path).ok()?;
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&path)
            .cloned()
    }

    /// All stored paths, including non-document files.
    pub fn paths(&self) -> Vec<String> {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn list(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        Ok(files
            .keys()
            .filter(|p| is_document_path(p) && is_under(p, dir))
            .cloned()
            .collect())
    }

    async fn read(&self, path: &str) -> Result<String, StoreError> {
        let path = normalize_path(path)?;
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.get(&path).cloned().ok_or(StoreError::NotFound(path))
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let path = normalize_path(path)?;
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.insert(path, content.to_string());
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let path = normalize_path(path)?;
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        Ok(files.contains_key(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_write_list() {
        let store = InMemoryDocumentStore::with_files([("b/two.md", "2"), ("a/meta.json", "{}")]);
        store.write("a/one.md", "1").await.unwrap();
        assert_eq!(store.read("a/one.md").await.unwrap(), "1");
        assert_eq!(
            store.list("").await.unwrap(),
            vec!["a/one.md".to_string(), "b/two.md".to_string()]
        );
        assert_eq!(store.list("b").await.unwrap(), vec!["b/two.md".to_string()]);
        assert!(store.exists("a/meta.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store.read("nope.md").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_escape() {
        let store = InMemoryDocumentStore::new();
        assert!(matches!(
            store.write("../x.md", "x").await,
            Err(StoreError::InvalidPath(_))
        ));
    }
}
