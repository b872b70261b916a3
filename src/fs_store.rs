//! Filesystem [`DocumentStore`] rooted at `[knowledge].root`.
//!
//! Listing walks the tree with `walkdir` and filters relative paths through
//! the configured include/exclude globs (plus VCS and build directories).
//! Reads and writes go through `tokio::fs`; parent directories are created
//! on write. Paths that try to leave the root are rejected.

use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use knowledge_digest_core::error::StoreError;
use knowledge_digest_core::store::{is_document_path, is_under, normalize_path, DocumentStore};

use crate::config::KnowledgeConfig;

pub struct FsDocumentStore {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

impl FsDocumentStore {
    pub fn new(config: &KnowledgeConfig) -> Result<Self> {
        let mut excludes = vec![
            "**/.git/**".to_string(),
            "**/node_modules/**".to_string(),
            "**/target/**".to_string(),
        ];
        excludes.extend(config.exclude_globs.iter().cloned());

        Ok(Self {
            root: config.root.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&excludes)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<(String, PathBuf), StoreError> {
        let rel = normalize_path(path)?;
        let full = self.root.join(&rel);
        Ok((rel, full))
    }

    fn walk(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| StoreError::Io {
                path: self.root.display().to_string(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path());
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }
            if is_document_path(&rel_str) {
                paths.push(rel_str);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn list(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        let all = self.walk()?;
        Ok(all.into_iter().filter(|p| is_under(p, dir)).collect())
    }

    async fn read(&self, path: &str) -> Result<String, StoreError> {
        let (rel, full) = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(rel)),
            Err(e) => Err(io_error(&full, e)),
        }
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let (_, full) = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| io_error(&full, e))
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let (_, full) = self.resolve(path)?;
        tokio::fs::try_exists(&full)
            .await
            .map_err(|e| io_error(&full, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(root: &Path, exclude: &[&str]) -> FsDocumentStore {
        let config = KnowledgeConfig {
            root: root.to_path_buf(),
            url_prefix: "/docs".to_string(),
            include_globs: vec!["**/*.md".to_string(), "**/*.mdx".to_string()],
            exclude_globs: exclude.iter().map(|s| s.to_string()).collect(),
            manifest_name: "meta.json".to_string(),
        };
        FsDocumentStore::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_list_applies_globs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("payment")).unwrap();
        std::fs::create_dir_all(root.join("drafts")).unwrap();
        std::fs::write(root.join("payment/stripe.md"), "# Stripe").unwrap();
        std::fs::write(root.join("payment/meta.json"), "{}").unwrap();
        std::fs::write(root.join("payment/notes.txt"), "x").unwrap();
        std::fs::write(root.join("drafts/wip.md"), "# WIP").unwrap();

        let s = store(root, &["drafts/**"]);
        assert_eq!(s.list("").await.unwrap(), vec!["payment/stripe.md"]);
        assert!(s.list("drafts").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_creates_dirs_and_reads_back() {
        let tmp = TempDir::new().unwrap();
        let s = store(tmp.path(), &[]);
        s.write("ai-models/claude.md", "# Claude").await.unwrap();
        assert_eq!(s.read("ai-models/claude.md").await.unwrap(), "# Claude");
        assert!(s.exists("ai-models/claude.md").await.unwrap());
        assert!(!s.exists("ai-models/gpt.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_root_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp.path().join("nope"), &[]);
        assert!(s.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let s = store(tmp.path(), &[]);
        assert!(matches!(
            s.read("payment/x.md").await,
            Err(StoreError::NotFound(p)) if p == "payment/x.md"
        ));
    }

    #[tokio::test]
    async fn test_rejects_escape() {
        let tmp = TempDir::new().unwrap();
        let s = store(tmp.path(), &[]);
        assert!(matches!(
            s.write("../outside.md", "x").await,
            Err(StoreError::InvalidPath(_))
        ));
    }
}
