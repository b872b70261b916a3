//! Knowledge base statistics and manifest health.
//!
//! Gives a quick summary of what the knowledge tree holds: documents per
//! category and whether each category manifest agrees with the files on
//! disk. Used by `kd stats` to catch hand edits that left a manifest
//! listing a deleted page, or a document the manifest never picked up.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

use knowledge_digest_core::error::StoreError;
use knowledge_digest_core::store::DocumentStore;
use knowledge_digest_core::taxonomy::Taxonomy;

use crate::config::Config;
use crate::fs_store::FsDocumentStore;

/// Per-category document counts and manifest drift.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryStats {
    pub slug: String,
    /// Empty for directories the taxonomy does not know.
    pub name: String,
    pub documents: usize,
    pub has_manifest: bool,
    /// Listed in the manifest but missing on disk.
    pub missing_pages: Vec<String>,
    /// On disk but not listed in the manifest.
    pub unlisted_pages: Vec<String>,
}

impl CategoryStats {
    pub fn is_healthy(&self) -> bool {
        self.missing_pages.is_empty() && self.unlisted_pages.is_empty()
    }
}

fn page_slug(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.rsplit_once('.').map_or(file, |(stem, _)| stem)
}

async fn manifest_pages(
    store: &dyn DocumentStore,
    path: &str,
) -> Result<Option<BTreeSet<String>>> {
    let raw = match store.read(path).await {
        Ok(raw) => raw,
        Err(StoreError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let pages = match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(value) => value
            .get("pages")
            .and_then(|p| p.as_array())
            .map(|pages| {
                pages
                    .iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "manifest is not valid JSON");
            BTreeSet::new()
        }
    };
    Ok(Some(pages))
}

/// Walk the store and compare each category directory with its manifest.
///
/// Taxonomy categories come first in enumeration order, then any other
/// top-level directories holding documents.
pub async fn collect_stats(
    store: &dyn DocumentStore,
    taxonomy: &Taxonomy,
    manifest_name: &str,
) -> Result<Vec<CategoryStats>> {
    let mut by_dir: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for path in store.list("").await? {
        if let Some((dir, _)) = path.split_once('/') {
            by_dir
                .entry(dir.to_string())
                .or_default()
                .insert(page_slug(&path).to_string());
        }
    }

    let mut dirs: Vec<(String, String)> = taxonomy
        .categories()
        .iter()
        .map(|c| (c.slug.clone(), c.name.clone()))
        .collect();
    for dir in by_dir.keys() {
        if taxonomy.find_by_slug(dir).is_none() {
            dirs.push((dir.clone(), String::new()));
        }
    }

    let mut stats = Vec::with_capacity(dirs.len());
    for (slug, name) in dirs {
        let pages = by_dir.remove(&slug).unwrap_or_default();
        let manifest = manifest_pages(store, &format!("{}/{}", slug, manifest_name)).await?;
        let (missing_pages, unlisted_pages) = match &manifest {
            Some(listed) => (
                listed.difference(&pages).cloned().collect(),
                pages.difference(listed).cloned().collect(),
            ),
            None => (Vec::new(), pages.iter().cloned().collect()),
        };
        stats.push(CategoryStats {
            slug,
            name,
            documents: pages.len(),
            has_manifest: manifest.is_some(),
            missing_pages,
            unlisted_pages,
        });
    }
    Ok(stats)
}

/// Run the stats command: scan the knowledge tree and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = FsDocumentStore::new(&config.knowledge)?;
    let taxonomy = config.load_taxonomy()?;
    let stats = collect_stats(&store, &taxonomy, &config.knowledge.manifest_name).await?;
    let total: usize = stats.iter().map(|s| s.documents).sum();

    println!("Knowledge Digest: knowledge base stats");
    println!("======================================");
    println!();
    println!("  Root:        {}", config.knowledge.root.display());
    println!("  Taxonomy:    {}", taxonomy.version());
    println!("  Documents:   {}", total);
    println!();
    println!(
        "  {:<16} {:<12} {:>6} {:>9}   {}",
        "CATEGORY", "NAME", "DOCS", "MANIFEST", "DRIFT"
    );
    println!("  {}", "-".repeat(64));

    for s in &stats {
        let drift = if s.is_healthy() {
            "-".to_string()
        } else {
            let mut parts = Vec::new();
            if !s.missing_pages.is_empty() {
                parts.push(format!("missing: {}", s.missing_pages.join(", ")));
            }
            if !s.unlisted_pages.is_empty() {
                parts.push(format!("unlisted: {}", s.unlisted_pages.join(", ")));
            }
            parts.join("; ")
        };
        let name = if s.name.is_empty() { "(unknown)" } else { &s.name };
        println!(
            "  {:<16} {:<12} {:>6} {:>9}   {}",
            s.slug,
            name,
            s.documents,
            if s.has_manifest { "yes" } else { "no" },
            drift
        );
    }
    println!();

    Ok(())
}
